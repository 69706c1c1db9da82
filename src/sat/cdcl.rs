use std::time::Instant;

use super::{SatSolver, SolveResult};
use crate::lit::Lit;

const NO_REASON: u32 = u32::MAX;
const VAR_DECAY: f64 = 0.95;
const ACTIVITY_CAP: f64 = 1e100;

/// A Minisat-like CDCL solver: two-watched-literal propagation, first-UIP
/// clause learning, activity-ordered decisions with saved phases, and
/// assumption-based final-conflict extraction.
///
/// Clause 0 is a permanent placeholder so that index 0 never names a real
/// clause; learned clauses share the same arena as problem clauses.
pub struct CdclSolver {
    clauses: Vec<Vec<Lit>>,
    // watches[lit] lists the clauses in which `lit` is one of the two
    // watched literals
    watches: Vec<Vec<u32>>,
    assigns: Vec<Option<bool>>,
    level: Vec<u32>,
    reason: Vec<u32>,
    trail: Vec<Lit>,
    trail_lim: Vec<u32>,
    qhead: usize,
    activity: Vec<f64>,
    var_inc: f64,
    polarity: Vec<bool>,
    seen: Vec<bool>,
    model: Vec<bool>,
    conflict: Vec<Lit>,
    ok: bool,
    deadline: Option<Instant>,
    n_conflicts: u64,
    n_checks: u32,
}

impl CdclSolver {
    fn value(&self, lit: Lit) -> Option<bool> {
        self.assigns[lit.var()].map(|v| v ^ lit.sign())
    }

    fn decision_level(&self) -> u32 {
        self.trail_lim.len() as u32
    }

    fn new_decision_level(&mut self) {
        self.trail_lim.push(self.trail.len() as u32);
    }

    fn enqueue(&mut self, lit: Lit, reason: u32) -> bool {
        match self.value(lit) {
            Some(v) => v,
            None => {
                let var = lit.var();
                self.assigns[var] = Some(!lit.sign());
                self.level[var] = self.decision_level();
                self.reason[var] = reason;
                self.trail.push(lit);
                true
            }
        }
    }

    fn cancel_until(&mut self, target: u32) {
        if self.decision_level() <= target {
            return;
        }
        let bound = self.trail_lim[target as usize] as usize;
        for lit in self.trail.drain(bound..) {
            let var = lit.var();
            self.assigns[var] = None;
            self.reason[var] = NO_REASON;
            self.polarity[var] = !lit.sign();
        }
        self.trail_lim.truncate(target as usize);
        self.qhead = self.trail.len();
    }

    /// Runs unit propagation; returns the index of a conflicting clause.
    fn propagate(&mut self) -> Option<u32> {
        while self.qhead < self.trail.len() {
            let p = self.trail[self.qhead];
            self.qhead += 1;
            let false_lit = p.compl();
            let mut watch_list = std::mem::take(&mut self.watches[false_lit.into_raw() as usize]);
            let mut keep = 0;
            let mut conflict = None;
            'clauses: for scan in 0..watch_list.len() {
                let ci = watch_list[scan];
                let clause = &mut self.clauses[ci as usize];
                // put the false literal at slot 1
                if clause[0] == false_lit {
                    clause.swap(0, 1);
                }
                debug_assert_eq!(clause[1], false_lit);
                let first = clause[0];
                if self.assigns[first.var()].map(|v| v ^ first.sign()) == Some(true) {
                    watch_list[keep] = ci;
                    keep += 1;
                    continue;
                }
                for slot in 2..clause.len() {
                    let lit = clause[slot];
                    if self.assigns[lit.var()].map(|v| v ^ lit.sign()) != Some(false) {
                        clause.swap(1, slot);
                        self.watches[lit.into_raw() as usize].push(ci);
                        continue 'clauses;
                    }
                }
                // no replacement watch: unit or conflicting
                watch_list[keep] = ci;
                keep += 1;
                if self.assigns[first.var()].map(|v| v ^ first.sign()) == Some(false) {
                    conflict = Some(ci);
                    // keep the remaining watches untouched
                    for slot in scan + 1..watch_list.len() {
                        watch_list[keep] = watch_list[slot];
                        keep += 1;
                    }
                    break;
                }
                self.enqueue(first, ci);
            }
            watch_list.truncate(keep);
            self.watches[false_lit.into_raw() as usize] = watch_list;
            if let Some(ci) = conflict {
                self.qhead = self.trail.len();
                return Some(ci);
            }
        }
        None
    }

    fn bump_var(&mut self, var: usize) {
        self.activity[var] += self.var_inc;
        if self.activity[var] > ACTIVITY_CAP {
            for act in &mut self.activity {
                *act *= 1.0 / ACTIVITY_CAP;
            }
            self.var_inc *= 1.0 / ACTIVITY_CAP;
        }
    }

    /// First-UIP conflict analysis. Returns the learned clause (asserting
    /// literal first) and the backjump level.
    fn analyze(&mut self, mut confl: u32) -> (Vec<Lit>, u32) {
        let mut learnt: Vec<Lit> = vec![Lit::NONE];
        let mut counter = 0usize;
        let mut index = self.trail.len();
        let mut p = Lit::NONE;
        loop {
            let start = if p == Lit::NONE { 0 } else { 1 };
            let reason_lits: Vec<Lit> = self.clauses[confl as usize][start..].to_vec();
            for q in reason_lits {
                let var = q.var();
                if !self.seen[var] && self.level[var] > 0 {
                    self.seen[var] = true;
                    self.bump_var(var);
                    if self.level[var] >= self.decision_level() {
                        counter += 1;
                    } else {
                        learnt.push(q);
                    }
                }
            }
            loop {
                index -= 1;
                if self.seen[self.trail[index].var()] {
                    break;
                }
            }
            p = self.trail[index];
            self.seen[p.var()] = false;
            counter -= 1;
            if counter == 0 {
                break;
            }
            confl = self.reason[p.var()];
            debug_assert_ne!(confl, NO_REASON);
        }
        learnt[0] = p.compl();
        // move a literal of the highest remaining level into slot 1
        let mut bt_level = 0;
        if learnt.len() > 1 {
            let mut max_slot = 1;
            for slot in 2..learnt.len() {
                if self.level[learnt[slot].var()] > self.level[learnt[max_slot].var()] {
                    max_slot = slot;
                }
            }
            learnt.swap(1, max_slot);
            bt_level = self.level[learnt[1].var()];
        }
        for &lit in &learnt {
            self.seen[lit.var()] = false;
        }
        self.var_inc /= VAR_DECAY;
        (learnt, bt_level)
    }

    /// Walks the implication trail to collect the assumptions responsible
    /// for the given seed, as negated literals.
    fn analyze_final_seed(&mut self, seed_lits: &[Lit]) {
        self.conflict.clear();
        if self.decision_level() == 0 {
            return;
        }
        for &lit in seed_lits {
            if self.level[lit.var()] > 0 {
                self.seen[lit.var()] = true;
            }
        }
        let bound = self.trail_lim[0] as usize;
        for index in (bound..self.trail.len()).rev() {
            let lit = self.trail[index];
            let var = lit.var();
            if !self.seen[var] {
                continue;
            }
            if self.reason[var] == NO_REASON {
                debug_assert!(self.level[var] > 0);
                self.conflict.push(lit.compl());
            } else {
                let reason = self.reason[var] as usize;
                for slot in 1..self.clauses[reason].len() {
                    let q = self.clauses[reason][slot];
                    if self.level[q.var()] > 0 {
                        self.seen[q.var()] = true;
                    }
                }
            }
            self.seen[var] = false;
        }
    }

    fn attach_clause(&mut self, lits: Vec<Lit>) -> u32 {
        debug_assert!(lits.len() >= 2);
        let ci = self.clauses.len() as u32;
        self.watches[lits[0].into_raw() as usize].push(ci);
        self.watches[lits[1].into_raw() as usize].push(ci);
        self.clauses.push(lits);
        ci
    }

    fn pick_branch_var(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for var in 0..self.assigns.len() {
            if self.assigns[var].is_none()
                && best.map_or(true, |b| self.activity[var] > self.activity[b])
            {
                best = Some(var);
            }
        }
        best
    }

    // coarse accounting: the clause arena dominates everything else
    fn memory_estimate(&self) -> usize {
        self.clauses
            .iter()
            .map(|clause| std::mem::size_of::<Lit>() * clause.capacity())
            .sum()
    }

    fn out_of_time(&mut self) -> bool {
        let Some(deadline) = self.deadline else {
            return false;
        };
        self.n_checks = self.n_checks.wrapping_add(1);
        if self.n_checks & 0x3FF != 0 {
            return false;
        }
        Instant::now() >= deadline
    }
}

impl SatSolver for CdclSolver {
    fn new() -> CdclSolver {
        CdclSolver {
            clauses: vec![Vec::new()],
            watches: Vec::new(),
            assigns: Vec::new(),
            level: Vec::new(),
            reason: Vec::new(),
            trail: Vec::new(),
            trail_lim: Vec::new(),
            qhead: 0,
            activity: Vec::new(),
            var_inc: 1.0,
            polarity: Vec::new(),
            seen: Vec::new(),
            model: Vec::new(),
            conflict: Vec::new(),
            ok: true,
            deadline: None,
            n_conflicts: 0,
            n_checks: 0,
        }
    }

    fn set_num_vars(&mut self, n_vars: usize) {
        if n_vars <= self.assigns.len() {
            return;
        }
        self.watches.resize(2 * n_vars, Vec::new());
        self.assigns.resize(n_vars, None);
        self.level.resize(n_vars, 0);
        self.reason.resize(n_vars, NO_REASON);
        self.activity.resize(n_vars, 0.0);
        self.polarity.resize(n_vars, false);
        self.seen.resize(n_vars, false);
    }

    fn num_vars(&self) -> usize {
        self.assigns.len()
    }

    fn add_clause(&mut self, lits: &[Lit]) -> bool {
        if !self.ok {
            return false;
        }
        debug_assert_eq!(self.decision_level(), 0);
        if let Some(max_var) = lits.iter().map(|l| l.var()).max() {
            self.set_num_vars(max_var + 1);
        }
        let mut sorted = lits.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let mut reduced: Vec<Lit> = Vec::with_capacity(sorted.len());
        for (slot, &lit) in sorted.iter().enumerate() {
            if slot + 1 < sorted.len() && sorted[slot + 1] == lit.compl() {
                return true; // tautology
            }
            match self.value(lit) {
                Some(true) => return true, // satisfied at the root level
                Some(false) => {}
                None => reduced.push(lit),
            }
        }
        match reduced.len() {
            0 => {
                self.ok = false;
                false
            }
            1 => {
                if !self.enqueue(reduced[0], NO_REASON) || self.propagate().is_some() {
                    self.ok = false;
                }
                self.ok
            }
            _ => {
                self.attach_clause(reduced);
                true
            }
        }
    }

    fn solve(
        &mut self,
        assumptions: &[Lit],
        conf_limit: Option<u64>,
        mem_limit: Option<usize>,
    ) -> SolveResult {
        self.conflict.clear();
        if !self.ok {
            return SolveResult::Unsat;
        }
        if let Some(max_var) = assumptions.iter().map(|l| l.var()).max() {
            self.set_num_vars(max_var + 1);
        }
        self.n_conflicts = 0;
        let result = loop {
            if let Some(confl) = self.propagate() {
                self.n_conflicts += 1;
                if self.decision_level() == 0 {
                    self.ok = false;
                    break SolveResult::Unsat;
                }
                if self.decision_level() <= assumptions.len() as u32 {
                    // the conflict is forced by the assumptions
                    let seed: Vec<Lit> = self.clauses[confl as usize].clone();
                    self.analyze_final_seed(&seed);
                    break SolveResult::Unsat;
                }
                let (learnt, bt_level) = self.analyze(confl);
                self.cancel_until(bt_level.max(assumptions.len() as u32));
                if learnt.len() == 1 {
                    self.cancel_until(0);
                    if !self.enqueue(learnt[0], NO_REASON) {
                        self.ok = false;
                        break SolveResult::Unsat;
                    }
                } else {
                    let asserting = learnt[0];
                    let ci = self.attach_clause(learnt);
                    if self.value(asserting).is_none() {
                        self.enqueue(asserting, ci);
                    }
                }
            } else {
                if conf_limit.is_some_and(|limit| limit > 0 && self.n_conflicts >= limit)
                    || mem_limit.is_some_and(|limit| self.memory_estimate() > limit)
                    || self.out_of_time()
                {
                    break SolveResult::Undef;
                }
                if (self.decision_level() as usize) < assumptions.len() {
                    let assumption = assumptions[self.decision_level() as usize];
                    match self.value(assumption) {
                        Some(true) => self.new_decision_level(),
                        Some(false) => {
                            self.analyze_final_seed(&[assumption.compl()]);
                            // the failed assumption itself is part of the core
                            self.conflict.push(assumption.compl());
                            self.conflict.sort_unstable();
                            self.conflict.dedup();
                            break SolveResult::Unsat;
                        }
                        None => {
                            self.new_decision_level();
                            self.enqueue(assumption, NO_REASON);
                        }
                    }
                } else if let Some(var) = self.pick_branch_var() {
                    self.new_decision_level();
                    self.enqueue(Lit::new(var, !self.polarity[var]), NO_REASON);
                } else {
                    self.model = self
                        .assigns
                        .iter()
                        .map(|value| value.unwrap_or(false))
                        .collect();
                    break SolveResult::Sat;
                }
            }
        };
        self.cancel_until(0);
        result
    }

    fn model_value(&self, var: usize) -> bool {
        self.model.get(var).copied().unwrap_or(false)
    }

    fn final_conflict(&self) -> &[Lit] {
        &self.conflict
    }

    fn set_polarity(&mut self, vars: &[usize]) {
        for &var in vars {
            if var < self.polarity.len() {
                self.polarity[var] = true;
            }
        }
    }

    fn set_runtime_limit(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    fn rollback(&mut self) {
        *self = CdclSolver::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(var: usize, neg: bool) -> Lit {
        Lit::new(var, neg)
    }

    #[test]
    fn trivial_sat_and_model() {
        let mut solver = CdclSolver::new();
        solver.add_clause(&[lit(0, false)]);
        solver.add_clause(&[lit(1, true)]);
        assert_eq!(solver.solve(&[], None, None), SolveResult::Sat);
        assert!(solver.model_value(0));
        assert!(!solver.model_value(1));
    }

    #[test]
    fn contradictory_units_are_unsat() {
        let mut solver = CdclSolver::new();
        assert!(solver.add_clause(&[lit(0, false)]));
        assert!(!solver.add_clause(&[lit(0, true)]));
        assert_eq!(solver.solve(&[], None, None), SolveResult::Unsat);
    }

    #[test]
    fn propagation_chain_unsat() {
        // (a) (!a | b) (!b | c) (!c)
        let mut solver = CdclSolver::new();
        solver.add_clause(&[lit(0, false)]);
        solver.add_clause(&[lit(0, true), lit(1, false)]);
        solver.add_clause(&[lit(1, true), lit(2, false)]);
        let ok = solver.add_clause(&[lit(2, true)]);
        assert!(!ok || solver.solve(&[], None, None) == SolveResult::Unsat);
    }

    #[test]
    fn pigeonhole_two_pigeons_one_hole() {
        // p0 and p1 both in the single hole, but not together
        let mut solver = CdclSolver::new();
        solver.add_clause(&[lit(0, false)]);
        solver.add_clause(&[lit(1, false)]);
        solver.add_clause(&[lit(0, true), lit(1, true)]);
        assert_eq!(solver.solve(&[], None, None), SolveResult::Unsat);
    }

    #[test]
    fn xor_instance_needs_search() {
        // x ^ y ^ z = 1 as CNF, satisfiable
        let mut solver = CdclSolver::new();
        solver.add_clause(&[lit(0, false), lit(1, false), lit(2, false)]);
        solver.add_clause(&[lit(0, false), lit(1, true), lit(2, true)]);
        solver.add_clause(&[lit(0, true), lit(1, false), lit(2, true)]);
        solver.add_clause(&[lit(0, true), lit(1, true), lit(2, false)]);
        assert_eq!(solver.solve(&[], None, None), SolveResult::Sat);
        let (x, y, z) = (
            solver.model_value(0),
            solver.model_value(1),
            solver.model_value(2),
        );
        assert!(x ^ y ^ z);
    }

    #[test]
    fn assumptions_restrict_models() {
        // (a | b), assume !a: model must set b
        let mut solver = CdclSolver::new();
        solver.add_clause(&[lit(0, false), lit(1, false)]);
        assert_eq!(solver.solve(&[lit(0, true)], None, None), SolveResult::Sat);
        assert!(!solver.model_value(0));
        assert!(solver.model_value(1));
    }

    #[test]
    fn final_conflict_names_failing_assumptions() {
        // a -> b, assume a and !b: both assumptions are in the core
        let mut solver = CdclSolver::new();
        solver.add_clause(&[lit(0, true), lit(1, false)]);
        let result = solver.solve(&[lit(0, false), lit(1, true)], None, None);
        assert_eq!(result, SolveResult::Unsat);
        let core = solver.final_conflict().to_vec();
        assert!(core.contains(&lit(0, true)) || core.contains(&lit(1, false)));
        // the core must only mention negated assumptions
        for l in core {
            assert!(l == lit(0, true) || l == lit(1, false));
        }
        // and the solver stays usable afterwards
        assert_eq!(solver.solve(&[], None, None), SolveResult::Sat);
    }

    #[test]
    fn final_conflict_is_a_subset() {
        // c is irrelevant: core must not contain it
        let mut solver = CdclSolver::new();
        solver.add_clause(&[lit(0, true), lit(1, false)]);
        let result = solver.solve(
            &[lit(2, false), lit(0, false), lit(1, true)],
            None,
            None,
        );
        assert_eq!(result, SolveResult::Unsat);
        let core = solver.final_conflict();
        assert!(!core.contains(&lit(2, true)));
        assert!(!core.contains(&lit(2, false)));
    }

    #[test]
    fn conflict_limit_returns_undef_or_answers() {
        let mut solver = CdclSolver::new();
        for v in 0..6 {
            solver.add_clause(&[lit(v, false), lit((v + 1) % 6, true)]);
        }
        let result = solver.solve(&[], Some(1), None);
        assert!(result == SolveResult::Sat || result == SolveResult::Undef);
    }

    #[test]
    fn rollback_clears_everything() {
        let mut solver = CdclSolver::new();
        solver.add_clause(&[lit(0, false)]);
        solver.add_clause(&[lit(0, true)]);
        assert_eq!(solver.solve(&[], None, None), SolveResult::Unsat);
        solver.rollback();
        solver.add_clause(&[lit(0, true)]);
        assert_eq!(solver.solve(&[], None, None), SolveResult::Sat);
        assert!(!solver.model_value(0));
    }

    #[test]
    fn repeated_incremental_use() {
        let mut solver = CdclSolver::new();
        solver.add_clause(&[lit(0, false), lit(1, false)]);
        assert_eq!(solver.solve(&[lit(0, true)], None, None), SolveResult::Sat);
        solver.add_clause(&[lit(1, true)]);
        assert_eq!(solver.solve(&[lit(0, true)], None, None), SolveResult::Unsat);
        assert_eq!(solver.solve(&[lit(0, false)], None, None), SolveResult::Sat);
        assert!(solver.model_value(0));
    }
}
