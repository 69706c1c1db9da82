use std::rc::Rc;

use super::cube::Cube;
use super::Pdr;
use crate::aig::tsim::{TER_ONE, TER_UND, TER_ZER};
use crate::lit::Lit;
use crate::sat::SatSolver;

/// Cube justification by ternary simulation: starting from the SAT model
/// of a satisfiable frame query, greedily turn register outputs into X
/// while the targeted outputs keep their model values. What remains
/// definite becomes the predecessor cube; the definite PIs are recorded
/// as the witness tail.
impl<S: SatSolver> Pdr<'_, S> {
    /// One-pass cone collection: marks the cone with the current
    /// traversal id and returns (CI leaves, internal nodes in DFS order).
    fn collect_cone(&mut self, roots: &[usize]) -> (Vec<usize>, Vec<usize>) {
        let mut ci_objs = Vec::new();
        let mut nodes = Vec::new();
        self.aig.trav_inc();
        self.aig.trav_set_current(0);
        for &root in roots {
            self.collect_cone_rec(root, &mut ci_objs, &mut nodes);
        }
        (ci_objs, nodes)
    }

    fn collect_cone_rec(&mut self, id: usize, ci_objs: &mut Vec<usize>, nodes: &mut Vec<usize>) {
        if self.aig.trav_is_current(id) {
            return;
        }
        self.aig.trav_set_current(id);
        if self.aig.is_ci(id) {
            ci_objs.push(id);
            return;
        }
        self.collect_cone_rec(self.aig.fanin0(id), ci_objs, nodes);
        if self.aig.is_co(id) {
            return;
        }
        self.collect_cone_rec(self.aig.fanin1(id), ci_objs, nodes);
        nodes.push(id);
    }

    /// Seeds the cone from the model and propagates once; returns false
    /// if any root deviates from its model value (which, with no X values
    /// injected, would indicate an inconsistent model).
    fn sim_data_init(
        &mut self,
        ci_objs: &[usize],
        ci_vals: &[bool],
        nodes: &[usize],
        co_objs: &[usize],
        co_vals: &[bool],
        ci2rem: &[usize],
    ) -> bool {
        self.tsim.set(0, TER_ZER);
        for (&obj, &value) in ci_objs.iter().zip(ci_vals) {
            self.tsim.set(obj, if value { TER_ONE } else { TER_ZER });
        }
        for &obj in ci2rem {
            self.tsim.set(obj, TER_UND);
        }
        for &obj in nodes {
            self.tsim.eval_obj(self.aig, obj);
        }
        for &obj in co_objs {
            self.tsim.eval_obj(self.aig, obj);
        }
        co_objs
            .iter()
            .zip(co_vals)
            .all(|(&obj, &value)| {
                self.tsim.get(obj) == if value { TER_ONE } else { TER_ZER }
            })
    }

    /// Tries to set one register output to X, re-propagating only the
    /// affected fanout inside the cone. Returns false (leaving `undo`
    /// filled) if some cone output loses its definite value.
    fn extend_one(&mut self, ro: usize, undo: &mut Vec<(usize, u32)>) -> bool {
        debug_assert!(self.aig.is_ro(ro));
        debug_assert!(self.aig.trav_is_current(ro));
        let old = self.tsim.get(ro);
        debug_assert!(old == TER_ZER || old == TER_ONE);
        undo.push((ro, old));
        self.tsim.set(ro, TER_UND);
        let mut visit = vec![ro];
        let mut index = 0;
        while index < visit.len() {
            let obj = visit[index];
            index += 1;
            for fan_index in 0..self.aig.fanouts(obj).len() {
                let fanout = self.aig.fanouts(obj)[fan_index];
                if !self.aig.trav_is_current(fanout) {
                    continue;
                }
                debug_assert!(obj < fanout);
                let before = self.tsim.get(fanout);
                if before == TER_UND {
                    continue;
                }
                let after = self.tsim.eval_obj(self.aig, fanout);
                if after == before {
                    continue;
                }
                debug_assert_eq!(after, TER_UND);
                undo.push((fanout, before));
                if self.aig.is_co(fanout) {
                    return false;
                }
                if let Err(slot) = visit.binary_search(&fanout) {
                    visit.insert(slot, fanout);
                }
            }
        }
        true
    }

    fn extend_undo(&mut self, undo: &[(usize, u32)]) {
        for &(obj, value) in undo {
            debug_assert_eq!(self.tsim.get(obj), TER_UND);
            self.tsim.set(obj, value);
        }
    }

    /// Justifies the SAT model of the last frame-`k` query. With
    /// `cube = None` the target is the property output; otherwise the
    /// targets are the register inputs named by the cube. Returns the
    /// predecessor state cube with its PI witness tail.
    pub(crate) fn ternary_sim(&mut self, k: usize, cube: Option<&Rc<Cube>>) -> Rc<Cube> {
        let co_objs: Vec<usize> = match cube {
            None => vec![self.property_po()],
            Some(cube) => cube
                .state_lits()
                .iter()
                .map(|lit| self.aig.ri(lit.var()))
                .collect(),
        };
        let (ci_objs, nodes) = self.collect_cone(&co_objs);
        let ci_vals = self.collect_values(k, &ci_objs);
        let co_vals = self.collect_values(k, &co_objs);

        self.tsim.grow(self.aig.n_objs());
        let consistent =
            self.sim_data_init(&ci_objs, &ci_vals, &nodes, &co_objs, &co_vals, &[]);
        assert!(consistent, "SAT model disagrees with simulation");

        // two passes: X out the low-priority flops first, then the rest
        let mut ci2rem: Vec<usize> = Vec::new();
        let mut undo: Vec<(usize, u32)> = Vec::new();
        for high_prio in [false, true] {
            for &obj in &ci_objs {
                if !self.aig.is_ro(obj) {
                    continue;
                }
                let reg = self.aig.ro_index(obj);
                if (self.v_prio[reg] != 0) != high_prio {
                    continue;
                }
                undo.clear();
                if self.extend_one(obj, &mut undo) {
                    ci2rem.push(obj);
                } else {
                    self.extend_undo(&undo);
                }
            }
        }
        let consistent =
            self.sim_data_init(&ci_objs, &ci_vals, &nodes, &co_objs, &co_vals, &ci2rem);
        assert!(consistent, "justified values disagree with the model");

        // surviving register outputs form the cube; definite PIs witness it
        let mut state = Vec::new();
        let mut pi_lits = Vec::new();
        for (&obj, &value) in ci_objs.iter().zip(&ci_vals) {
            if self.aig.is_pi(obj) {
                pi_lits.push(Lit::new(self.aig.cio_id(obj), !value));
            } else if !ci2rem.contains(&obj) {
                state.push(Lit::new(self.aig.ro_index(obj), !value));
            }
        }
        if state.is_empty() && self.aig.n_regs() > 0 {
            // every flop is X: pick an arbitrary non-initial literal to
            // keep the cube well-formed
            state.push(Lit::new(0, false));
        }
        Cube::new(&state, &pi_lits)
    }
}
