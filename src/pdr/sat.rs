use std::rc::Rc;

use super::cube::Cube;
use super::Pdr;
use crate::lit::Lit;
use crate::sat::{SatSolver, SolveResult};

/// Answer of a cube query against a frame.
pub(crate) enum CubeCheck {
    /// UNSAT: the cube (or the property) holds in the frame.
    Holds,
    /// SAT: reachable; carries the justified predecessor if requested.
    Fails(Option<Rc<Cube>>),
    /// Conflict budget or deadline exhausted.
    Undef,
}

/// Frame/solver fabric: one incremental SAT context per frame, recycled
/// when its activation-variable count exceeds the threshold.
impl<S: SatSolver> Pdr<'_, S> {
    /// Opens the solver for frame `k` and admits the property cone.
    pub(crate) fn create_solver(&mut self, k: usize) {
        assert_eq!(self.solvers.len(), k);
        assert_eq!(self.clauses.len(), k);
        assert_eq!(self.act_vars.len(), k);
        self.solvers.push(S::new());
        self.clauses.push(Vec::new());
        self.act_vars.push(0);
        self.new_solver(k, k == 0);
        let po = self.property_po();
        self.obj_sat_var(k, po);
    }

    /// Returns frame `k`'s solver index after recycling it if its
    /// activation-variable count has reached the threshold: the solver is
    /// reset, the CNF rebuilt, and every clause at this or a higher frame
    /// reasserted.
    pub(crate) fn fetch_solver(&mut self, k: usize) {
        if self.pars.n_recycle == 0 || self.act_vars[k] < self.pars.n_recycle {
            return;
        }
        assert!(k < self.solvers.len() - 1);
        self.stats.n_starts += 1;
        self.solvers[k].rollback();
        self.new_solver(k, k == 0);
        self.act_vars[k] = 0;
        let po = self.property_po();
        self.obj_sat_var(k, po);
        self.set_property_output(k);
        for frame in k..self.clauses.len() {
            for index in 0..self.clauses[frame].len() {
                let cube = self.clauses[frame][index].clone();
                self.solver_add_clause(k, &cube);
            }
        }
    }

    /// Permanently asserts that the property output is low at frame `k`.
    /// Skipped in solve-all mode, where no single output is privileged.
    pub(crate) fn set_property_output(&mut self, k: usize) {
        if self.pars.f_solve_all {
            return;
        }
        let po = self.property_po();
        let var = self.obj_sat_var(k, po);
        let ok = self.solvers[k].add_clause(&[Lit::new(var, true)]);
        assert!(ok, "property assertion contradicts frame {k}");
    }

    /// Translates a state cube into frame-`k` solver literals, over the
    /// register outputs (`next = false`) or register inputs
    /// (`next = true`), complementing every literal when `compl` is set.
    pub(crate) fn cube_to_lits(
        &mut self,
        k: usize,
        cube: &Cube,
        compl: bool,
        next: bool,
    ) -> Vec<Lit> {
        let mut lits = Vec::with_capacity(cube.n_lits());
        for &lit in cube.state_lits() {
            let obj = if next {
                self.aig.ri(lit.var())
            } else {
                self.aig.ro(lit.var())
            };
            let var = self.obj_sat_var(k, obj);
            lits.push(Lit::new(var, compl ^ lit.sign()));
        }
        lits
    }

    /// Translates SAT literals (a final conflict) back into state-cube
    /// literals, dropping activation and internal variables.
    pub(crate) fn lits_to_cube(&self, k: usize, sat_lits: &[Lit]) -> Vec<Lit> {
        let mut lits = Vec::with_capacity(sat_lits.len());
        for &lit in sat_lits {
            if let Some(reg) = self.obj_reg_num(k, lit.var()) {
                debug_assert!(reg < self.aig.n_regs());
                lits.push(Lit::new(reg, !lit.sign()));
            }
        }
        lits
    }

    /// Asserts the clause `!cube` (over register outputs) at frame `k`.
    pub(crate) fn solver_add_clause(&mut self, k: usize, cube: &Cube) {
        let lits = self.cube_to_lits(k, cube, true, false);
        let ok = self.solvers[k].add_clause(&lits);
        assert!(ok, "frame clause contradicts frame {k}");
    }

    /// Reads the model values of the given objects after a SAT answer.
    pub(crate) fn collect_values(&mut self, k: usize, objs: &[usize]) -> Vec<bool> {
        let mut values = Vec::with_capacity(objs.len());
        for &obj in objs {
            let var = self.obj_sat_var(k, obj);
            values.push(self.solvers[k].model_value(var));
        }
        values
    }

    /// Is `cube` already excluded by the frame-`k` clauses themselves
    /// (no transition involved)?
    pub(crate) fn check_cube_cs(&mut self, k: usize, cube: &Cube) -> Option<bool> {
        if self.stopped_by_callback() {
            return None;
        }
        self.fetch_solver(k);
        let lits = self.cube_to_lits(k, cube, false, false);
        match self.solvers[k].solve(&lits, None, None) {
            SolveResult::Undef => None,
            SolveResult::Unsat => Some(true),
            SolveResult::Sat => Some(false),
        }
    }

    /// The central query. With `cube = None`, asks whether a bad state is
    /// reachable in frame `k` (property literal assumed high). Otherwise
    /// performs the relative-induction check of `cube` against frame `k`:
    /// the clause `!cube` is asserted under a fresh activation literal
    /// and the cube is assumed over the next-state variables.
    pub(crate) fn check_cube(
        &mut self,
        k: usize,
        cube: Option<&Rc<Cube>>,
        want_pred: bool,
        conf_limit: u64,
    ) -> CubeCheck {
        self.stats.n_calls += 1;
        if self.stopped_by_callback() {
            return CubeCheck::Undef;
        }
        let budget = (conf_limit > 0).then_some(conf_limit);
        self.fetch_solver(k);
        let result = match cube {
            None => {
                let po = self.property_po();
                let var = self.obj_sat_var(k, po);
                self.solvers[k].solve(&[Lit::new(var, false)], budget, None)
            }
            Some(cube) => {
                // the activation protocol makes the clause retractable:
                // it is only binding while !act is assumed
                self.act_vars[k] += 1;
                let mut clause = self.cube_to_lits(k, cube, true, false);
                let act = Lit::new(self.free_var(k), false);
                clause.push(act);
                let ok = self.solvers[k].add_clause(&clause);
                assert!(ok, "activation clause contradicts frame {k}");
                let mut assumptions = self.cube_to_lits(k, cube, false, true);
                assumptions.push(act.compl());
                self.solvers[k].solve(&assumptions, budget, None)
            }
        };
        match result {
            SolveResult::Undef => CubeCheck::Undef,
            SolveResult::Unsat => {
                self.stats.n_calls_unsat += 1;
                CubeCheck::Holds
            }
            SolveResult::Sat => {
                self.stats.n_calls_sat += 1;
                let pred = want_pred.then(|| self.ternary_sim(k, cube));
                CubeCheck::Fails(pred)
            }
        }
    }
}
