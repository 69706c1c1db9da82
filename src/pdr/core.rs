use std::rc::Rc;
use std::time::{Duration, Instant};

use super::cube::Cube;
use super::queue::Obligation;
use super::sat::CubeCheck;
use super::{Pdr, PdrStatus, OUT_DISPROVED, OUT_PROVED, OUT_UNDECIDED, OUT_UNKNOWN};
use crate::cex::Cex;
use crate::lit::Lit;
use crate::sat::SatSolver;

enum Generalized {
    /// The cube holds by relative induction; carries the minimized cube.
    Holds(Rc<Cube>),
    /// Reachable; carries the justified predecessor.
    Fails(Rc<Cube>),
    Undef,
}

enum OutputOutcome {
    /// No bad state reachable in this frame for the current output.
    Held,
    /// A counter-example trace is queued in `cex_obl`.
    Refuted,
    /// The per-output budget ran out; the engine keeps going.
    OutTimeout,
    /// A global resource gate fired.
    Abort,
}

impl<S: SatSolver> Pdr<'_, S> {
    /// Positions of the cube's literals, cheapest-to-drop first: flops
    /// that appear in few learned clauses go early.
    fn sort_by_priority(&self, cube: &Cube) -> Vec<usize> {
        let mut order: Vec<usize> = (0..cube.n_lits()).collect();
        order.sort_by_key(|&i| (self.v_prio[cube.state_lits()[i].var()], i));
        order
    }

    /// Shrinks a cube that was just proved by relative induction, using
    /// the solver's final conflict. Returns `None` when the core brings
    /// no improvement. A cube that collapsed onto the initial state gets
    /// one positive literal of the original back.
    fn reduce_clause(&mut self, k: usize, cube: &Rc<Cube>) -> Option<Rc<Cube>> {
        let core: Vec<Lit> = self.solvers[k].final_conflict().to_vec();
        let mut lits = self.lits_to_cube(k, &core);
        if lits.len() == cube.n_lits() {
            return None;
        }
        assert!(lits.len() < cube.n_lits());
        if lits.iter().all(|lit| lit.sign()) {
            let positive = cube
                .state_lits()
                .iter()
                .find(|lit| !lit.sign())
                .expect("blocked cube cannot be the initial state");
            lits.push(*positive);
        }
        let cube_min = cube.subset(&lits);
        assert!(!cube_min.is_init(None));
        Some(cube_min)
    }

    /// Checks relative induction of `cube` at frame `k` and, on success,
    /// minimizes it: first by the unsat core, then by greedy literal
    /// dropping in priority order, re-checking after every tentative
    /// drop. Drops that would cover the initial state are skipped.
    fn generalize(&mut self, k: usize, cube: &Rc<Cube>) -> Generalized {
        let conf_limit = self.pars.n_conf_limit;
        match self.check_cube(k, Some(cube), true, conf_limit) {
            CubeCheck::Undef => return Generalized::Undef,
            CubeCheck::Fails(pred) => {
                return Generalized::Fails(pred.expect("predecessor requested"));
            }
            CubeCheck::Holds => {}
        }
        let mut cube_min = self.reduce_clause(k, cube).unwrap_or_else(|| cube.clone());
        if !self.pars.f_skip_general {
            let rounds = if self.pars.f_two_rounds { 2 } else { 1 };
            for _ in 0..rounds {
                let mut order = self.sort_by_priority(&cube_min);
                let mut j = 0;
                while j < cube_min.n_lits() {
                    let i = order[j];
                    if cube_min.is_init(Some(i)) {
                        j += 1;
                        continue;
                    }
                    let candidate = cube_min.without(i);
                    match self.check_cube(k, Some(&candidate), false, conf_limit) {
                        CubeCheck::Undef => return Generalized::Undef,
                        CubeCheck::Fails(_) => j += 1,
                        CubeCheck::Holds => {
                            cube_min = candidate;
                            assert!(cube_min.n_lits() > 0);
                            order = self.sort_by_priority(&cube_min);
                        }
                    }
                }
            }
        }
        Generalized::Holds(cube_min)
    }

    /// True iff the cube is excluded by a clause already stored at frame
    /// `k` or above.
    fn check_containment(&self, k: usize, cube: &Cube) -> bool {
        self.clauses[k..]
            .iter()
            .any(|frame| frame.iter().any(|clause| cube.contains(clause)))
    }

    /// Blocks a bad-state cube reached in the last frame. Returns 1 when
    /// every obligation was discharged, 0 when an obligation reached
    /// frame 0 (a counter-example), -1 on resource exhaustion.
    fn block_cube(&mut self, cube: Rc<Cube>) -> i8 {
        self.stats.n_blocks += 1;
        let mut prio: i64 = i64::MAX / 2;
        let k_max = self.solvers.len() - 1;
        prio -= 1;
        self.queue.push(Obligation::new(k_max, prio, cube, None));
        self.stats.n_obligs += 1;
        while !self.queue.is_empty() {
            let head = self.queue.head().cloned().unwrap();
            if head.frame == 0 {
                self.cex_obl = Some(head);
                return 0;
            }
            if head.frame > k_max {
                return 1; // this level is finished
            }
            if self.n_que_lim > 0 && self.queue.len() >= self.n_que_lim {
                self.n_que_lim = self.n_que_lim * 3 / 2;
                self.queue.clear();
                return 1; // restart with a larger budget
            }
            let obl = self.queue.pop().unwrap();
            assert!(obl.frame > 0);
            assert!(!obl.state.is_init(None));
            if self.check_containment(obl.frame, &obl.state) {
                continue;
            }
            match self.check_cube_cs(obl.frame, &obl.state) {
                None => return -1,
                Some(true) => continue, // already excluded by the frame
                Some(false) => {}
            }
            match self.generalize(obl.frame - 1, &obl.state) {
                Generalized::Undef => return -1,
                Generalized::Holds(cube_min) => {
                    // find the deepest frame where the clause still holds
                    let mut k = obl.frame;
                    let mut undef = false;
                    while k < k_max {
                        match self.check_cube(k, Some(&cube_min), false, 0) {
                            CubeCheck::Undef => {
                                undef = true;
                                break;
                            }
                            CubeCheck::Holds => k += 1,
                            CubeCheck::Fails(_) => break,
                        }
                    }
                    if undef {
                        return -1;
                    }
                    for &lit in cube_min.state_lits() {
                        assert!(lit.var() < self.v_prio.len());
                        self.v_prio[lit.var()] += 1;
                    }
                    self.clauses[k].push(cube_min.clone());
                    self.stats.n_cubes += 1;
                    for frame in 1..=k {
                        self.solver_add_clause(frame, &cube_min);
                    }
                    if (k < k_max || self.pars.f_reuse_oblig) && !self.pars.f_shortest {
                        prio -= 1;
                        self.queue.push(Obligation::new(
                            k + 1,
                            prio,
                            obl.state.clone(),
                            obl.next.clone(),
                        ));
                        self.stats.n_obligs += 1;
                    }
                }
                Generalized::Fails(pred) => {
                    prio -= 1;
                    let parent = Obligation::new(
                        obl.frame,
                        prio,
                        obl.state.clone(),
                        obl.next.clone(),
                    );
                    self.queue.push(parent.clone());
                    prio -= 1;
                    self.queue.push(Obligation::new(
                        obl.frame - 1,
                        prio,
                        pred,
                        Some(parent),
                    ));
                    self.stats.n_obligs += 2;
                }
            }
            if self.stopped_by_callback()
                || self.past_global_deadline()
                || self.past_output_deadline()
                || self.past_gap_deadline()
            {
                return -1;
            }
        }
        1
    }

    /// Tries to advance every clause one frame. Returns 1 when a frame
    /// ended up empty (an inductive invariant exists), -1 on resource
    /// exhaustion, 0 otherwise.
    fn push_clauses(&mut self) -> i8 {
        let mut ret = 0;
        let k_max = self.solvers.len() - 1;
        for k in 1..k_max {
            self.clauses[k].sort_by(|a, b| a.compare(b));
            let mut j = 0;
            while j < self.clauses[k].len() {
                let cube_k = self.clauses[k][j].clone();
                // drop same-frame clauses subsumed by this one
                let mut m = j + 1;
                while m < self.clauses[k].len() {
                    if self.clauses[k][m].contains(&cube_k) {
                        self.clauses[k].swap_remove(m);
                    } else {
                        m += 1;
                    }
                }
                match self.check_cube(k, Some(&cube_k), false, 0) {
                    CubeCheck::Undef => return -1,
                    CubeCheck::Fails(_) => {
                        j += 1;
                        continue;
                    }
                    CubeCheck::Holds => {}
                }
                let cube_k = self.reduce_clause(k, &cube_k).unwrap_or(cube_k);
                self.solver_add_clause(k + 1, &cube_k);
                let mut i = 0;
                while i < self.clauses[k + 1].len() {
                    if self.clauses[k + 1][i].contains(&cube_k) {
                        self.clauses[k + 1].swap_remove(i);
                    } else {
                        i += 1;
                    }
                }
                self.clauses[k + 1].push(cube_k);
                self.clauses[k].swap_remove(j);
            }
            if self.clauses[k].is_empty() {
                ret = 1;
            }
        }
        // final subsumption sweep over the last frame
        self.clauses[k_max].sort_by(|a, b| a.compare(b));
        let mut j = 0;
        while j < self.clauses[k_max].len() {
            let cube_j = self.clauses[k_max][j].clone();
            let mut m = j + 1;
            while m < self.clauses[k_max].len() {
                if self.clauses[k_max][m].contains(&cube_j) {
                    self.clauses[k_max].swap_remove(m);
                } else {
                    m += 1;
                }
            }
            j += 1;
        }
        ret
    }

    /// Unwinds the obligation chain behind a frame-0 obligation into a
    /// counter-example: each obligation contributes the PI assignment of
    /// one time frame.
    fn derive_cex(&mut self) -> Cex {
        let head = self.cex_obl.take().expect("no counter-example chain");
        let n_frames = head.chain_len();
        let (n_regs, n_pis) = (self.aig.n_regs(), self.aig.n_pis());
        let mut cex = Cex::new(n_regs, n_pis, n_frames - 1);
        cex.i_po = self.i_out_cur;
        let mut cursor = Some(&head);
        let mut frame = 0;
        while let Some(obl) = cursor {
            for &lit in obl.state.pi_lits() {
                debug_assert!(lit.var() < n_pis);
                if !lit.sign() {
                    cex.set_bit(n_regs + frame * n_pis + lit.var());
                }
            }
            frame += 1;
            cursor = obl.next.as_ref();
        }
        cex
    }

    /// Drives one output at the current frame until it holds, is
    /// refuted, or a budget runs out.
    fn solve_one_output(&mut self, k: usize) -> OutputOutcome {
        loop {
            if self.past_gap_deadline() {
                return OutputOutcome::Abort;
            }
            match self.check_cube(k, None, true, self.pars.n_conf_limit) {
                CubeCheck::Holds => return OutputOutcome::Held,
                CubeCheck::Undef => {
                    if self.past_output_deadline() {
                        self.queue.clear();
                        return OutputOutcome::OutTimeout;
                    }
                    return OutputOutcome::Abort;
                }
                CubeCheck::Fails(pred) => {
                    let pred = pred.expect("predecessor requested");
                    if self.aig.n_regs() == 0 {
                        // combinational failure: the PI witness is the trace
                        self.cex_obl = Some(Obligation::new(0, 0, pred, None));
                        return OutputOutcome::Refuted;
                    }
                    match self.block_cube(pred) {
                        -1 => {
                            if self.past_output_deadline() {
                                self.queue.clear();
                                return OutputOutcome::OutTimeout;
                            }
                            return OutputOutcome::Abort;
                        }
                        0 => return OutputOutcome::Refuted,
                        _ => {}
                    }
                }
            }
        }
    }

    /// The outer frame loop.
    pub(crate) fn solve_int(&mut self) -> PdrStatus {
        self.time_to_stop = (self.pars.n_time_out > 0)
            .then(|| Instant::now() + Duration::from_secs(self.pars.n_time_out));
        let deadline = self.time_to_stop;
        for solver in &mut self.solvers {
            solver.set_runtime_limit(deadline);
        }
        self.time_last_solved = Instant::now();
        let n_pos = self.aig.n_pos();
        let mut n_fail_outs = 0usize;
        let mut n_drop_outs = 0usize;
        if self.pars.f_solve_all {
            for i_out in 0..n_pos {
                let po = self.aig.po(i_out);
                if self.aig.child0(po) == Lit::FALSE {
                    self.out_map[i_out] = OUT_PROVED;
                }
            }
        }
        let mut k = if self.solvers.is_empty() {
            self.create_solver(0);
            0
        } else {
            self.solvers.len() - 1
        };
        loop {
            self.stats.n_frames = k;
            let outputs: Vec<usize> = if self.pars.f_solve_all {
                (0..n_pos).collect()
            } else {
                vec![self.pars.i_output]
            };
            for i_out in outputs {
                if self.pars.f_solve_all {
                    let decided = self.out_map[i_out] == OUT_PROVED
                        || self.out_map[i_out] == OUT_DISPROVED
                        || self.out_map[i_out] == OUT_UNDECIDED;
                    if decided || self.time4outs[i_out] == Some(Duration::ZERO) {
                        continue;
                    }
                }
                self.i_out_cur = i_out;
                let po = self.aig.po(i_out);
                let driver = self.aig.child0(po);
                if driver == Lit::FALSE {
                    continue;
                }
                if driver == Lit::TRUE {
                    let cex = Cex::trivial(self.aig.n_regs(), self.aig.n_pis(), i_out, k);
                    self.i_frame = k as i64;
                    if !self.pars.f_solve_all {
                        self.cex = Some(cex);
                        return PdrStatus::Disproved;
                    }
                    self.out_map[i_out] = OUT_DISPROVED;
                    self.cexes[i_out] = Some(cex);
                    n_fail_outs += 1;
                    self.time_last_solved = Instant::now();
                    if n_fail_outs + n_drop_outs == n_pos {
                        return PdrStatus::Disproved;
                    }
                    continue;
                }
                let out_clock = Instant::now();
                if let Some(budget) = self.time4outs[i_out] {
                    self.time_to_stop_one = Some(out_clock + budget);
                }
                let outcome = self.solve_one_output(k);
                if let Some(budget) = self.time4outs[i_out] {
                    self.time4outs[i_out] = Some(budget.saturating_sub(out_clock.elapsed()));
                    self.time_to_stop_one = None;
                }
                match outcome {
                    OutputOutcome::Held => {}
                    OutputOutcome::Refuted => {
                        let cex = self.derive_cex();
                        self.queue.clear();
                        self.i_frame = k as i64;
                        if !self.pars.f_solve_all {
                            self.cex = Some(cex);
                            return PdrStatus::Disproved;
                        }
                        self.out_map[i_out] = OUT_DISPROVED;
                        self.cexes[i_out] = Some(cex);
                        n_fail_outs += 1;
                        self.time_last_solved = Instant::now();
                        if n_fail_outs + n_drop_outs == n_pos {
                            return PdrStatus::Disproved;
                        }
                    }
                    OutputOutcome::OutTimeout => {
                        self.time4outs[i_out] = Some(Duration::ZERO);
                        self.out_map[i_out] = OUT_UNDECIDED;
                        n_drop_outs += 1;
                        if n_fail_outs + n_drop_outs == n_pos {
                            return if n_fail_outs > 0 {
                                PdrStatus::Disproved
                            } else {
                                PdrStatus::Undecided
                            };
                        }
                    }
                    OutputOutcome::Abort => {
                        self.i_frame = k as i64;
                        return PdrStatus::Undecided;
                    }
                }
            }
            // open the next timeframe
            self.n_que_lim = self.pars.n_rest_limit;
            self.set_property_output(k);
            self.create_solver(k + 1);
            k += 1;
            match self.push_clauses() {
                -1 => {
                    self.i_frame = k as i64;
                    return PdrStatus::Undecided;
                }
                1 => {
                    self.i_frame = k as i64;
                    if self.pars.f_solve_all {
                        for entry in &mut self.out_map {
                            if *entry == OUT_UNKNOWN {
                                *entry = OUT_PROVED;
                            }
                        }
                        return if n_fail_outs > 0 {
                            PdrStatus::Disproved
                        } else if n_drop_outs > 0 {
                            PdrStatus::Undecided
                        } else {
                            PdrStatus::Proved
                        };
                    }
                    return PdrStatus::Proved;
                }
                _ => {}
            }
            if !self.pars.f_reuse_oblig {
                self.queue.clear();
            }
            if self.stopped_by_callback()
                || self.past_global_deadline()
                || self.past_gap_deadline()
                || (self.pars.n_frame_max > 0 && k >= self.pars.n_frame_max)
            {
                self.i_frame = k as i64;
                return PdrStatus::Undecided;
            }
        }
    }

    /// Runs the engine and validates its own answer: counter-examples
    /// are replayed on the AIG, invariants re-checked for induction.
    pub fn run(&mut self) -> PdrStatus {
        let status = self.solve_int();
        match status {
            PdrStatus::Disproved => {
                let cexes = self.cex.iter().chain(self.cexes.iter().flatten());
                for cex in cexes {
                    if let Err(err) = cex.verify(self.aig) {
                        panic!("derived counter-example failed replay: {err}");
                    }
                }
            }
            PdrStatus::Proved => {
                let failures = self.verify_invariant();
                assert_eq!(failures, 0, "inductive invariant failed verification");
            }
            PdrStatus::Undecided => {}
        }
        status
    }
}
