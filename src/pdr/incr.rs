use anyhow::{ensure, Result};

use std::rc::Rc;

use super::cube::Cube;
use super::sat::CubeCheck;
use super::{Pars, Pdr, PdrResult};
use crate::aig::Aig;
use crate::sat::{CdclSolver, SatSolver};

/// A frame database detached from its manager, for re-running the
/// engine across abstraction-refinement iterations.
#[derive(Clone, Debug, Default)]
pub struct SavedFrames {
    frames: Vec<Vec<Rc<Cube>>>,
}

impl SavedFrames {
    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }
}

impl<S: SatSolver> Pdr<'_, S> {
    /// Snapshots the frame clauses. With `drop_last` the (incomplete)
    /// last frame is left behind. Returns `None` when there is nothing
    /// worth saving.
    pub fn save_clauses(&self, drop_last: bool) -> Option<SavedFrames> {
        if self.clauses.len() <= 1 || (self.clauses.len() == 2 && drop_last) {
            return None;
        }
        let keep = self.clauses.len() - drop_last as usize;
        Some(SavedFrames { frames: self.clauses[..keep].to_vec() })
    }

    /// Rebuilds one solver per saved frame and reloads every clause into
    /// it. Only valid on a freshly created manager.
    pub fn restore_clauses(&mut self, saved: SavedFrames) {
        assert!(self.solvers.is_empty(), "restore into a used manager");
        assert!(!saved.frames.is_empty());
        self.clauses = saved.frames;
        let n_total = self.clauses.len();
        for k in 0..n_total {
            self.restore_solver(k, n_total);
        }
    }

    fn restore_solver(&mut self, k: usize, n_total: usize) {
        assert_eq!(self.solvers.len(), k);
        assert_eq!(self.act_vars.len(), k);
        self.solvers.push(S::new());
        self.act_vars.push(0);
        self.new_solver(k, k == 0);
        let po = self.property_po();
        self.obj_sat_var(k, po);
        if k + 1 < n_total {
            self.set_property_output(k);
        }
        if k == 0 {
            return;
        }
        for frame in k..self.clauses.len() {
            for index in 0..self.clauses[frame].len() {
                let cube = self.clauses[frame][index].clone();
                self.solver_add_clause(k, &cube);
            }
        }
    }

    /// Re-checks that every reloaded clause is still inductive relative
    /// to its previous frame. Returns the number of failing cubes.
    pub fn check_clauses(&mut self) -> usize {
        let mut failures = 0;
        for k in 1..self.clauses.len() {
            for index in 0..self.clauses[k].len() {
                let cube = self.clauses[k][index].clone();
                match self.check_cube(k - 1, Some(&cube), false, 0) {
                    CubeCheck::Holds => {}
                    _ => failures += 1,
                }
            }
        }
        failures
    }
}

/// One incremental run: restores the saved frame database (validating
/// every reloaded clause), solves, and hands back the refreshed database
/// so the caller can continue in a later run.
pub fn solve_incremental(
    aig: &mut Aig,
    pars: &Pars,
    saved: Option<SavedFrames>,
) -> Result<(PdrResult, Option<SavedFrames>)> {
    let mut pdr: Pdr<'_, CdclSolver> = Pdr::new(aig, pars.clone());
    if let Some(saved) = saved {
        pdr.restore_clauses(saved);
        let failures = pdr.check_clauses();
        ensure!(
            failures == 0,
            "{failures} reloaded clauses are no longer inductive"
        );
    }
    let status = pdr.run();
    let saved = pdr.save_clauses(status == super::PdrStatus::Undecided);
    Ok((pdr.into_result(status), saved))
}
