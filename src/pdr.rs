use serde::Serialize;

use std::rc::Rc;
use std::time::{Duration, Instant};

pub mod cnf;
pub mod core;
pub mod cube;
pub mod incr;
pub mod inv;
pub mod portfolio;
pub mod queue;
pub mod sat;
pub mod tsim;

use crate::aig::tsim::TernarySim;
use crate::aig::Aig;
use crate::cex::Cex;
use crate::cnf::Cnf;
use crate::sat::{CdclSolver, SatSolver};
use cube::Cube;
use queue::{ObligQueue, Obligation};

/// Engine parameters with the stock defaults.
#[derive(Clone, Debug, Serialize)]
pub struct Pars {
    /// Zero-based output to solve (ignored in solve-all mode).
    pub i_output: usize,
    /// Activation-variable count that triggers solver recycling.
    pub n_recycle: usize,
    /// Limit on the number of timeframes (0 = none).
    pub n_frame_max: usize,
    /// SAT conflict budget per query (0 = none).
    pub n_conf_limit: u64,
    /// Initial proof-obligation count triggering a restart (0 = none).
    pub n_rest_limit: usize,
    /// Global timeout in seconds (0 = none).
    pub n_time_out: u64,
    /// Timeout in seconds since the last solved output (0 = none).
    pub n_time_out_gap: u64,
    /// Per-output timeout in milliseconds, solve-all mode (0 = none).
    pub n_time_out_one: u64,
    /// Second round of literal dropping during generalization.
    pub f_two_rounds: bool,
    /// Use one up-front CNF instead of on-demand clause loading.
    pub f_mono_cnf: bool,
    /// Dump the inductive invariant as a PLA file on completion.
    pub f_dump_inv: bool,
    /// Force shortest counter-examples (no obligation re-enqueueing).
    pub f_shortest: bool,
    /// Skip the literal-dropping generalization step.
    pub f_skip_general: bool,
    /// Keep proof obligations alive across frame boundaries.
    pub f_reuse_oblig: bool,
    /// Solve every output instead of a single one.
    pub f_solve_all: bool,
    pub f_verbose: bool,
    pub f_very_verbose: bool,
}

impl Default for Pars {
    fn default() -> Pars {
        Pars {
            i_output: 0,
            n_recycle: 300,
            n_frame_max: 10000,
            n_conf_limit: 0,
            n_rest_limit: 0,
            n_time_out: 0,
            n_time_out_gap: 0,
            n_time_out_one: 0,
            f_two_rounds: false,
            f_mono_cnf: false,
            f_dump_inv: false,
            f_shortest: false,
            f_skip_general: false,
            f_reuse_oblig: false,
            f_solve_all: false,
            f_verbose: false,
            f_very_verbose: false,
        }
    }
}

/// Overall verdict of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PdrStatus {
    Proved,
    Disproved,
    Undecided,
}

impl PdrStatus {
    /// The conventional integer encoding.
    pub fn exit_code(self) -> i32 {
        match self {
            PdrStatus::Proved => 1,
            PdrStatus::Disproved => 0,
            PdrStatus::Undecided => -1,
        }
    }
}

/// Per-output verdicts in solve-all mode.
pub const OUT_UNDECIDED: i8 = -1;
pub const OUT_DISPROVED: i8 = 0;
pub const OUT_PROVED: i8 = 1;
pub(crate) const OUT_UNKNOWN: i8 = -2;

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct Stats {
    pub n_blocks: usize,
    pub n_obligs: usize,
    pub n_cubes: usize,
    pub n_calls: usize,
    pub n_calls_sat: usize,
    pub n_calls_unsat: usize,
    pub n_starts: usize,
    pub n_frames: usize,
}

/// The PDR manager: the AIG under proof, the per-frame solver fabric,
/// the frame clauses, the obligation queue and assorted scratch state.
pub struct Pdr<'a, S: SatSolver = CdclSolver> {
    pub(crate) pars: Pars,
    pub(crate) aig: &'a mut Aig,
    // monolithic CNF
    pub(crate) cnf_mono: Option<Cnf>,
    pub(crate) var2reg: Vec<i32>,
    // on-demand CNF
    pub(crate) cnf2: Option<Cnf>,
    pub(crate) id2vars: Vec<Vec<u32>>,
    pub(crate) var2ids: Vec<Vec<i32>>,
    // frame fabric
    pub(crate) solvers: Vec<S>,
    pub(crate) clauses: Vec<Vec<Rc<Cube>>>,
    pub(crate) act_vars: Vec<usize>,
    pub(crate) queue: ObligQueue,
    pub(crate) n_que_lim: usize,
    // blocking state
    pub(crate) v_prio: Vec<u64>,
    pub(crate) i_out_cur: usize,
    pub(crate) cex_obl: Option<Rc<Obligation>>,
    pub(crate) tsim: TernarySim,
    // results
    pub cex: Option<Cex>,
    pub cexes: Vec<Option<Cex>>,
    pub out_map: Vec<i8>,
    pub stats: Stats,
    /// Deepest frame fully explored.
    pub i_frame: i64,
    // resource gates
    pub(crate) time_to_stop: Option<Instant>,
    pub(crate) time_to_stop_one: Option<Instant>,
    pub(crate) time_last_solved: Instant,
    pub(crate) time4outs: Vec<Option<Duration>>,
    pub(crate) stop_callback: Option<Box<dyn Fn() -> bool + Send>>,
}

impl<'a, S: SatSolver> Pdr<'a, S> {
    pub fn new(aig: &'a mut Aig, pars: Pars) -> Pdr<'a, S> {
        assert!(pars.f_solve_all || pars.i_output < aig.n_pos());
        if !aig.has_fanouts() {
            aig.fanout_start();
        }
        let n_objs = aig.n_objs();
        let n_regs = aig.n_regs();
        let n_pos = aig.n_pos();
        let time4outs = if pars.f_solve_all && pars.n_time_out_one > 0 {
            vec![Some(Duration::from_millis(pars.n_time_out_one)); n_pos]
        } else {
            vec![None; n_pos]
        };
        Pdr {
            i_out_cur: if pars.f_solve_all { 0 } else { pars.i_output },
            pars,
            aig,
            cnf_mono: None,
            var2reg: Vec::new(),
            cnf2: None,
            id2vars: vec![Vec::new(); n_objs],
            var2ids: Vec::new(),
            solvers: Vec::new(),
            clauses: Vec::new(),
            act_vars: Vec::new(),
            queue: ObligQueue::new(),
            n_que_lim: 0,
            v_prio: vec![0; n_regs],
            cex_obl: None,
            tsim: TernarySim::new(n_objs),
            cex: None,
            cexes: vec![None; n_pos],
            out_map: vec![OUT_UNKNOWN; n_pos],
            stats: Stats::default(),
            i_frame: -1,
            time_to_stop: None,
            time_to_stop_one: None,
            time_last_solved: Instant::now(),
            time4outs,
            stop_callback: None,
        }
    }

    /// Installs a cooperative cancellation callback, polled at every SAT
    /// call boundary. Returning true stops the engine with `Undecided`.
    pub fn set_stop_callback(&mut self, callback: Box<dyn Fn() -> bool + Send>) {
        self.stop_callback = Some(callback);
    }

    pub(crate) fn stopped_by_callback(&self) -> bool {
        self.stop_callback.as_ref().is_some_and(|cb| cb())
    }

    pub(crate) fn past_global_deadline(&self) -> bool {
        self.time_to_stop.is_some_and(|t| Instant::now() > t)
    }

    pub(crate) fn past_output_deadline(&self) -> bool {
        self.time_to_stop_one.is_some_and(|t| Instant::now() > t)
    }

    pub(crate) fn past_gap_deadline(&self) -> bool {
        self.pars.n_time_out_gap > 0
            && Instant::now()
                > self.time_last_solved + Duration::from_secs(self.pars.n_time_out_gap)
    }

    /// The parameters this engine was started with.
    pub fn pars(&self) -> &Pars {
        &self.pars
    }

    /// The PO object currently under proof.
    pub(crate) fn property_po(&self) -> usize {
        self.aig.po(self.i_out_cur)
    }

    pub fn invariant_cubes(&self) -> Vec<Rc<Cube>> {
        let start = self.find_invariant_start();
        self.collect_cubes(start)
    }
}

/// Runs PDR on the given AIG with the default CDCL backend.
pub fn solve(aig: &mut Aig, pars: &Pars) -> anyhow::Result<PdrResult> {
    let mut pdr: Pdr<'_, CdclSolver> = Pdr::new(aig, pars.clone());
    let status = pdr.run();
    if pdr.pars.f_dump_inv {
        let mut file = std::fs::File::create("inv.pla")?;
        pdr.dump_clauses(&mut file, status == PdrStatus::Proved)?;
    }
    Ok(pdr.into_result(status))
}

/// Bundled outcome of a run.
#[derive(Debug)]
pub struct PdrResult {
    pub status: PdrStatus,
    pub cex: Option<Cex>,
    pub cexes: Vec<Option<Cex>>,
    pub out_map: Vec<i8>,
    /// Inductive-invariant clauses (as state cubes) when proved.
    pub invariant: Vec<Rc<Cube>>,
    pub i_frame: i64,
    pub stats: Stats,
}

impl<S: SatSolver> Pdr<'_, S> {
    pub(crate) fn into_result(mut self, status: PdrStatus) -> PdrResult {
        let invariant = if status == PdrStatus::Proved {
            self.invariant_cubes()
        } else {
            Vec::new()
        };
        // leftover unknowns become undecided
        for entry in &mut self.out_map {
            if *entry == OUT_UNKNOWN {
                *entry = OUT_UNDECIDED;
            }
        }
        PdrResult {
            status,
            cex: self.cex.take(),
            cexes: std::mem::take(&mut self.cexes),
            out_map: std::mem::take(&mut self.out_map),
            invariant,
            i_frame: self.i_frame,
            stats: self.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_exit_codes_follow_the_convention() {
        assert_eq!(PdrStatus::Proved.exit_code(), 1);
        assert_eq!(PdrStatus::Disproved.exit_code(), 0);
        assert_eq!(PdrStatus::Undecided.exit_code(), -1);
    }
}
