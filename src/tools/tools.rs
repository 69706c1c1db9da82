mod info;
use info::print_info;
mod solve;
use solve::solve_property;
mod rewrite;
use rewrite::rewrite_aiger;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Work with AIGER files: inspect, re-emit, and model-check them
#[derive(Clone, Debug, Parser)]
struct Args {
    /// input AIGER file (plain, gzip or zlib compressed)
    #[arg(short, long)]
    input: PathBuf,
    // operation to execute
    #[command(subcommand)]
    operation: Operation,
}

#[derive(Clone, Debug, Subcommand)]
enum Operation {
    /// Print design statistics
    Info,
    /// Read and write the file back, normalizing the node order
    Rewrite(RewriteArgs),
    /// Prove or refute the safety outputs with PDR
    Solve(SolveArgs),
}

#[derive(Clone, Debug, Parser)]
struct RewriteArgs {
    /// output filename
    output: PathBuf,
    /// keep the symbol table
    #[arg(long)]
    symbols: bool,
    /// smallest standard-conforming output
    #[arg(long)]
    compact: bool,
}

#[derive(Clone, Debug, Parser)]
struct SolveArgs {
    /// zero-based output to solve
    #[arg(short, long, default_value_t = 0)]
    output: usize,
    /// solve every output
    #[arg(long)]
    solve_all: bool,
    /// global timeout in seconds
    #[arg(short, long, default_value_t = 0)]
    timeout: u64,
    /// SAT conflict budget per query
    #[arg(short, long, default_value_t = 0)]
    conf_limit: u64,
    /// limit on the number of timeframes
    #[arg(short, long, default_value_t = 10000)]
    frame_max: usize,
    /// use one monolithic CNF instead of on-demand loading
    #[arg(long)]
    mono_cnf: bool,
    /// write the inductive invariant to this PLA file
    #[arg(long)]
    dump_inv: Option<PathBuf>,
    /// print per-run statistics; -vv also dumps the invariant clauses
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    match &args.operation {
        Operation::Info => print_info(&args.input),
        Operation::Rewrite(rewrite_args) => rewrite_aiger(&args.input, rewrite_args),
        Operation::Solve(solve_args) => solve_property(&args.input, solve_args),
    }
}
