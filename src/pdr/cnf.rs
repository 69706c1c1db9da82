use super::Pdr;
use crate::cnf::Cnf;
use crate::lit::Lit;
use crate::sat::SatSolver;

/// The CNF façade. Two strategies share one interface:
///
/// * monolithic — one Tseitin CNF is derived up front and loaded whole
///   into every frame solver; SAT variables coincide with object ids and
///   the register map is a flat table;
/// * on-demand — a frame solver receives only the clauses of the
///   transitive fanin actually referenced by its queries, through the
///   per-(object, frame) variable maps.
impl<S: SatSolver> Pdr<'_, S> {
    fn ensure_mono_cnf(&mut self) {
        if self.cnf_mono.is_some() {
            return;
        }
        let cnf = Cnf::derive(self.aig);
        let mut var2reg = vec![-1i32; cnf.n_vars];
        for reg in 0..self.aig.n_regs() {
            var2reg[self.aig.ri(reg)] = reg as i32;
        }
        self.var2reg = var2reg;
        self.cnf_mono = Some(cnf);
    }

    fn ensure_demand_cnf(&mut self) {
        if self.cnf2.is_none() {
            self.cnf2 = Some(Cnf::derive(self.aig));
        }
    }

    /// (Re)initializes the CNF side of the solver at frame `k`.
    pub(crate) fn new_solver(&mut self, k: usize, init: bool) {
        let deadline = self.time_to_stop;
        if self.pars.f_mono_cnf {
            self.ensure_mono_cnf();
            let cnf = self.cnf_mono.as_ref().unwrap();
            let solver = &mut self.solvers[k];
            solver.set_num_vars(cnf.n_vars);
            for index in 0..cnf.n_clauses() {
                let ok = solver.add_clause(cnf.clause(index));
                assert!(ok, "transition CNF is contradictory");
            }
            if init {
                for reg in 0..self.aig.n_regs() {
                    let ok = solver.add_clause(&[Lit::new(self.aig.ro(reg), true)]);
                    assert!(ok, "initial-state units are contradictory");
                }
            }
        } else {
            self.ensure_demand_cnf();
            while self.var2ids.len() <= k {
                self.var2ids.push(Vec::new());
            }
            let stale = std::mem::take(&mut self.var2ids[k]);
            for obj in stale {
                if obj >= 0 {
                    self.id2vars[obj as usize][k] = 0;
                }
            }
            // variable 0 stays unused so that a missing map entry is 0
            self.var2ids[k].push(-1);
            self.solvers[k].set_num_vars(1);
        }
        self.solvers[k].set_runtime_limit(deadline);
    }

    /// SAT variable of `obj` in the frame-`k` solver. Under the on-demand
    /// strategy this admits the transitive fanin of `obj` into the solver
    /// on first touch.
    pub(crate) fn obj_sat_var(&mut self, k: usize, obj: usize) -> usize {
        if self.pars.f_mono_cnf {
            obj
        } else {
            self.obj_sat_var_demand(k, obj)
        }
    }

    fn obj_sat_var_demand(&mut self, k: usize, obj: usize) -> usize {
        if self.id2vars[obj].len() <= k {
            self.id2vars[obj].resize(k + 1, 0);
        }
        let known = self.id2vars[obj][k];
        if known != 0 {
            return known as usize;
        }
        let var = self.var2ids[k].len();
        self.var2ids[k].push(obj as i32);
        self.id2vars[obj][k] = var as u32;
        self.solvers[k].set_num_vars(var + 1);
        if k == 0 && self.aig.is_ro(obj) {
            // the initial state pins every register output to zero
            let ok = self.solvers[k].add_clause(&[Lit::new(var, true)]);
            assert!(ok, "initial-state unit is contradictory");
        }
        if !self.aig.is_ci(obj) {
            let obj_clauses: Vec<Vec<Lit>> = self
                .cnf2
                .as_ref()
                .unwrap()
                .obj_clauses(obj)
                .map(|clause| clause.to_vec())
                .collect();
            for clause in obj_clauses {
                let translated: Vec<Lit> = clause
                    .iter()
                    .map(|lit| {
                        let var = self.obj_sat_var_demand(k, lit.var());
                        Lit::new(var, lit.sign())
                    })
                    .collect();
                let ok = self.solvers[k].add_clause(&translated);
                assert!(ok, "transition CNF is contradictory");
            }
        }
        var
    }

    /// Register number of a frame-`k` SAT variable, if it stands for a
    /// register input; activation and internal variables map to `None`.
    pub(crate) fn obj_reg_num(&self, k: usize, var: usize) -> Option<usize> {
        if self.pars.f_mono_cnf {
            let n_vars = self.cnf_mono.as_ref().map_or(0, |cnf| cnf.n_vars);
            if var >= n_vars {
                return None;
            }
            let reg = self.var2reg[var];
            (reg >= 0).then_some(reg as usize)
        } else {
            let obj = self.var2ids[k][var];
            if obj < 0 {
                return None;
            }
            let obj = obj as usize;
            self.aig.is_ri(obj).then(|| self.aig.ri_index(obj))
        }
    }

    /// Index of a fresh, unconstrained SAT variable at frame `k`.
    pub(crate) fn free_var(&mut self, k: usize) -> usize {
        if self.pars.f_mono_cnf {
            let var = self.solvers[k].num_vars();
            self.solvers[k].set_num_vars(var + 1);
            var
        } else {
            let var = self.var2ids[k].len();
            self.var2ids[k].push(-1);
            self.solvers[k].set_num_vars(var + 1);
            var
        }
    }
}
