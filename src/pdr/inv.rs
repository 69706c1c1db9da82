use anyhow::Result;

use std::io::Write;
use std::rc::Rc;

use super::cube::Cube;
use super::Pdr;
use crate::sat::{SatSolver, SolveResult};

/// Invariant extraction and reporting.
impl<S: SatSolver> Pdr<'_, S> {
    /// First frame whose clause list is empty; the union of all clauses
    /// at and above it is the inductive invariant. Falls back to the
    /// last frame when no frame is empty (failed or undecided runs).
    pub(crate) fn find_invariant_start(&self) -> usize {
        let k_max = self.clauses.len().saturating_sub(1);
        (1..=k_max)
            .find(|&k| self.clauses[k].is_empty())
            .unwrap_or(k_max)
    }

    /// All clauses stored at frames `k_start..`, sorted for output.
    pub(crate) fn collect_cubes(&self, k_start: usize) -> Vec<Rc<Cube>> {
        let mut cubes: Vec<Rc<Cube>> = self.clauses[k_start.min(self.clauses.len())..]
            .iter()
            .flat_map(|frame| frame.iter().cloned())
            .collect();
        cubes.sort_by(|a, b| a.compare(b));
        cubes
    }

    /// How often each flop occurs in the given cubes.
    fn count_flops(&self, cubes: &[Rc<Cube>]) -> Vec<usize> {
        let mut counts = vec![0; self.aig.n_regs()];
        for cube in cubes {
            for lit in cube.state_lits() {
                counts[lit.var()] += 1;
            }
        }
        counts
    }

    /// One-line summary of the discovered invariant.
    pub fn report_invariant(&self) -> String {
        let k_start = self.find_invariant_start();
        let cubes = self.collect_cubes(k_start);
        let used = self
            .count_flops(&cubes)
            .iter()
            .filter(|&&count| count > 0)
            .count();
        format!(
            "Invariant F[{k_start}] : {} clauses with {used} flops (out of {})",
            cubes.len(),
            self.aig.n_regs()
        )
    }

    /// Dumps the frame clauses as a PLA file over the flops that occur
    /// in them: one row per cube, `1`/`0` for literal polarity, `-` for
    /// an absent flop.
    pub fn dump_clauses(&self, out: &mut impl Write, proved: bool) -> Result<()> {
        let k_start = self.find_invariant_start();
        let cubes = self.collect_cubes(k_start);
        let counts = self.count_flops(&cubes);
        let n_regs = self.aig.n_regs();
        let kept: Vec<usize> = (0..n_regs).filter(|&reg| counts[reg] > 0).collect();
        if proved {
            writeln!(
                out,
                "# Inductive invariant for \"{}\"",
                self.aig.name.as_deref().unwrap_or("unknown")
            )?;
        } else {
            writeln!(
                out,
                "# Clauses of the last timeframe for \"{}\"",
                self.aig.name.as_deref().unwrap_or("unknown")
            )?;
        }
        writeln!(out, ".i {}", kept.len())?;
        writeln!(out, ".o 1")?;
        writeln!(out, ".p {}", cubes.len())?;
        write!(out, ".ilb")?;
        for &reg in &kept {
            let name = self
                .aig
                .ci_names
                .as_ref()
                .map(|names| names[self.aig.n_pis() + reg].clone())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| format!("l{reg}"));
            write!(out, " {name}")?;
        }
        writeln!(out)?;
        writeln!(out, ".ob inv")?;
        for cube in &cubes {
            let mut row = vec![b'-'; n_regs];
            for lit in cube.state_lits() {
                row[lit.var()] = if lit.sign() { b'0' } else { b'1' };
            }
            for &reg in &kept {
                out.write_all(&[row[reg]])?;
            }
            writeln!(out, " 1")?;
        }
        writeln!(out, ".e")?;
        Ok(())
    }

    /// Re-checks that the extracted invariant is closed under the
    /// transition relation: a scratch frame is loaded with the property
    /// assertion and every invariant clause, and each cube is then
    /// checked unreachable over the next-state variables. Returns the
    /// number of failing clauses.
    pub fn verify_invariant(&mut self) -> usize {
        let k_start = self.find_invariant_start();
        let cubes = self.collect_cubes(k_start);
        let k_this = self.solvers.len();
        self.create_solver(k_this);
        self.set_property_output(k_this);
        for cube in &cubes {
            self.solver_add_clause(k_this, cube);
        }
        let mut failures = 0;
        for cube in &cubes {
            let assumptions = self.cube_to_lits(k_this, cube, false, true);
            if self.solvers[k_this].solve(&assumptions, None, None) != SolveResult::Unsat {
                failures += 1;
            }
        }
        // drop the scratch frame
        self.solvers.pop();
        self.clauses.pop();
        self.act_vars.pop();
        failures
    }
}
