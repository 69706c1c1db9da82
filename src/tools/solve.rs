use std::fs::File;
use std::path::Path;

use anyhow::{ensure, Result};

use aig_rs::aiger::read_aiger;
use aig_rs::pdr::{self, Pars, Pdr, PdrStatus};
use aig_rs::sat::CdclSolver;

use crate::SolveArgs;

pub fn solve_property(input: &Path, args: &SolveArgs) -> Result<()> {
    let mut aig = read_aiger(input)?;
    ensure!(aig.n_pos() > 0, "design has no outputs to check");
    ensure!(
        args.solve_all || args.output < aig.n_pos(),
        "output {} out of range (design has {})",
        args.output,
        aig.n_pos()
    );
    let pars = Pars {
        i_output: args.output,
        n_frame_max: args.frame_max,
        n_conf_limit: args.conf_limit,
        n_time_out: args.timeout,
        f_mono_cnf: args.mono_cnf,
        f_solve_all: args.solve_all,
        f_verbose: args.verbose >= 1,
        f_very_verbose: args.verbose >= 2,
        ..Pars::default()
    };
    let mut engine: Pdr<'_, CdclSolver> = Pdr::new(&mut aig, pars);
    let status = engine.run();
    match status {
        PdrStatus::Proved => {
            println!("Property proved.  {}", engine.report_invariant());
            if engine.pars().f_very_verbose {
                let mut dump = Vec::new();
                engine.dump_clauses(&mut dump, true)?;
                print!("{}", String::from_utf8_lossy(&dump));
            }
        }
        PdrStatus::Disproved => match &engine.cex {
            Some(cex) => println!(
                "Property disproved: output {} fails in frame {}.",
                cex.i_po, cex.i_frame
            ),
            None => println!("Property disproved."),
        },
        PdrStatus::Undecided => println!("Property undecided."),
    }
    if args.solve_all {
        for (index, verdict) in engine.out_map.iter().enumerate() {
            let text = match *verdict {
                pdr::OUT_PROVED => "proved",
                pdr::OUT_DISPROVED => "disproved",
                _ => "undecided",
            };
            println!("output {index}: {text}");
        }
    }
    if engine.pars().f_verbose {
        let stats = engine.stats;
        println!(
            "Block = {}  Oblig = {}  Clause = {}  Call = {} (sat {}, unsat {})  Start = {}",
            stats.n_blocks,
            stats.n_obligs,
            stats.n_cubes,
            stats.n_calls,
            stats.n_calls_sat,
            stats.n_calls_unsat,
            stats.n_starts
        );
    }
    if let Some(path) = &args.dump_inv {
        let mut file = File::create(path)?;
        engine.dump_clauses(&mut file, status == PdrStatus::Proved)?;
        println!("invariant written to {}", path.display());
    }
    std::process::exit(status.exit_code());
}
