use std::time::Instant;

use crate::lit::Lit;

pub mod cdcl;

pub use cdcl::CdclSolver;

/// Outcome of a SAT query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveResult {
    Sat,
    Unsat,
    Undef,
}

/// The narrow solver interface the proof engine is written against.
///
/// Any Minisat-like backend fits: incremental clause addition, solving
/// under assumptions with an optional conflict budget, model access, and
/// the final-conflict subset of the assumptions after an UNSAT answer
/// (negated, Minisat-style). `rollback` resets the solver so it can be
/// reloaded, which the frame-recycling protocol uses.
pub trait SatSolver {
    fn new() -> Self;
    fn set_num_vars(&mut self, n_vars: usize);
    fn num_vars(&self) -> usize;
    /// Returns false if the clause set became trivially unsatisfiable.
    fn add_clause(&mut self, lits: &[Lit]) -> bool;
    fn solve(
        &mut self,
        assumptions: &[Lit],
        conf_limit: Option<u64>,
        mem_limit: Option<usize>,
    ) -> SolveResult;
    /// Value of `var` in the model of the last `Sat` answer.
    fn model_value(&self, var: usize) -> bool;
    /// After an `Unsat` answer under assumptions: the negations of the
    /// assumption literals that participated in the refutation.
    fn final_conflict(&self) -> &[Lit];
    /// Sets the preferred decision phase of the given variables to true.
    fn set_polarity(&mut self, vars: &[usize]);
    fn set_runtime_limit(&mut self, deadline: Option<Instant>);
    /// Drops all clauses and state; variables must be re-declared.
    fn rollback(&mut self);
}
