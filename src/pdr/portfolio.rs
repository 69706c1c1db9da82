use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::cube::Cube;
use super::{Pars, Pdr, PdrResult, PdrStatus, Stats};
use crate::aig::Aig;
use crate::cex::Cex;
use crate::lit::Lit;
use crate::sat::CdclSolver;

// what a worker ships back across the thread boundary; invariant cubes
// travel as plain literal vectors because the shared-ownership cubes are
// single-threaded by design
struct WorkerResult {
    status: PdrStatus,
    cex: Option<Cex>,
    cexes: Vec<Option<Cex>>,
    out_map: Vec<i8>,
    invariant: Vec<(Vec<Lit>, Vec<Lit>)>,
    i_frame: i64,
    stats: Stats,
}

impl WorkerResult {
    fn from_result(result: PdrResult) -> WorkerResult {
        WorkerResult {
            status: result.status,
            cex: result.cex,
            cexes: result.cexes,
            out_map: result.out_map,
            invariant: result
                .invariant
                .iter()
                .map(|cube| (cube.state_lits().to_vec(), cube.pi_lits().to_vec()))
                .collect(),
            i_frame: result.i_frame,
            stats: result.stats,
        }
    }

    fn into_result(self) -> PdrResult {
        PdrResult {
            status: self.status,
            cex: self.cex,
            cexes: self.cexes,
            out_map: self.out_map,
            invariant: self
                .invariant
                .iter()
                .map(|(state, pi)| Cube::new(state, pi))
                .collect(),
            i_frame: self.i_frame,
            stats: self.stats,
        }
    }
}

/// Runs several independent engine configurations on duplicates of the
/// AIG, one OS thread each. Every engine owns its AIG, frames, solvers
/// and cubes; the only shared state is a solved flag polled through the
/// cooperative stop callback, so the first engine to finish makes its
/// peers exit cleanly at their next SAT-call boundary.
///
/// Returns the first decided result (index into `configs`), or an
/// undecided one if nobody decides.
pub fn solve_portfolio(aig: &Aig, configs: Vec<Pars>) -> Option<(usize, PdrResult)> {
    assert!(!configs.is_empty());
    let solved = Arc::new(AtomicBool::new(false));
    let mut workers = Vec::new();
    for (index, pars) in configs.into_iter().enumerate() {
        let solved = Arc::clone(&solved);
        // each worker gets its own duplicate of the design
        let mut local = duplicate_for_worker(aig);
        workers.push(std::thread::spawn(move || {
            let mut pdr: Pdr<'_, CdclSolver> = Pdr::new(&mut local, pars);
            let flag = Arc::clone(&solved);
            pdr.set_stop_callback(Box::new(move || flag.load(Ordering::Relaxed)));
            let status = pdr.run();
            if status != PdrStatus::Undecided {
                solved.store(true, Ordering::Relaxed);
            }
            (index, WorkerResult::from_result(pdr.into_result(status)))
        }));
    }
    let mut fallback = None;
    let mut winner: Option<(usize, PdrResult)> = None;
    for worker in workers {
        let Ok((index, result)) = worker.join() else {
            continue;
        };
        let result = result.into_result();
        if result.status != PdrStatus::Undecided {
            if winner.as_ref().map_or(true, |(best, _)| index < *best) {
                winner = Some((index, result));
            }
        } else {
            fallback = Some((index, result));
        }
    }
    winner.or(fallback)
}

// index-order copy that leaves the shared source untouched (the dup kit
// stamps scratch words and needs the source mutable)
fn duplicate_for_worker(aig: &Aig) -> Aig {
    let mut copy = Aig::start(aig.n_objs());
    copy.name = aig.name.clone();
    for id in 1..aig.n_objs() {
        if aig.is_ci(id) {
            copy.append_ci();
        } else if aig.is_co(id) {
            copy.append_co(aig.child0(id));
        } else {
            copy.append_and(aig.child0(id), aig.child1(id));
        }
    }
    copy.set_reg_num(aig.n_regs());
    copy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portfolio_agrees_with_single_run() {
        // unreachable bad state: two stuck-at-zero flops
        let mut aig = Aig::start(16);
        let p = aig.append_ci();
        let q = aig.append_ci();
        let bad = aig.append_and(p, q);
        aig.append_co(bad);
        aig.append_co(p);
        aig.append_co(q);
        aig.set_reg_num(2);
        let mono = Pars { f_mono_cnf: true, ..Pars::default() };
        let demand = Pars::default();
        let (_, result) =
            solve_portfolio(&aig, vec![mono, demand]).expect("portfolio result");
        assert_eq!(result.status, PdrStatus::Proved);
    }
}
