use std::path::Path;

use anyhow::Result;

use aig_rs::aiger::{read_aiger, write_aiger};

use crate::RewriteArgs;

pub fn rewrite_aiger(input: &Path, args: &RewriteArgs) -> Result<()> {
    let mut aig = read_aiger(input)?;
    if !aig.is_normalized() {
        aig = aig.dup_normalized();
    }
    write_aiger(&mut aig, &args.output, args.symbols, args.compact)?;
    println!(
        "wrote {} ({} objects)",
        args.output.display(),
        aig.n_objs()
    );
    Ok(())
}
