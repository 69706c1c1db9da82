use std::path::Path;

use anyhow::Result;

use aig_rs::aiger::read_aiger;

pub fn print_info(input: &Path) -> Result<()> {
    let mut aig = read_aiger(input)?;
    println!(
        "{}: pi = {}, po = {}, ff = {}, and = {}",
        aig.name.as_deref().unwrap_or("<unnamed>"),
        aig.n_pis(),
        aig.n_pos(),
        aig.n_regs(),
        aig.n_ands()
    );
    let roots: Vec<usize> = aig.cos().to_vec();
    println!(
        "reachable and = {}, support = {} of {} CIs",
        aig.cone_size(&roots),
        aig.supp_size(&roots),
        aig.n_cis()
    );
    if aig.has_equivs() {
        println!(
            "equivalences: {} classes, {} literals",
            aig.equiv_count_classes(),
            aig.equiv_count_lits()
        );
    }
    if let Some(mapping) = &aig.mapping {
        println!("mapping: {} LUTs", mapping.len());
    }
    Ok(())
}
