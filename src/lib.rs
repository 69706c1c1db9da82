#![forbid(unsafe_code)]
pub mod aig;
pub mod aiger;
pub mod cex;
pub mod cnf;
pub mod lit;
pub mod pdr;
pub mod sat;

#[cfg(test)]
mod test;

pub use aig::Aig;
pub use cex::Cex;
pub use lit::Lit;
pub use pdr::{Pars, Pdr, PdrStatus};
