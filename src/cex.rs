use anyhow::{ensure, Result};
use serde::Serialize;

use crate::aig::tsim::{TernarySim, TER_ONE, TER_ZER};
use crate::aig::Aig;

/// A sequential counter-example: the initial register state followed by
/// one block of PI values per time frame, bit-packed LSB-first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Cex {
    pub i_po: usize,
    pub i_frame: usize,
    pub n_regs: usize,
    pub n_pis: usize,
    bits: Vec<u8>,
}

impl Cex {
    pub fn new(n_regs: usize, n_pis: usize, i_frame: usize) -> Cex {
        let n_bits = n_regs + (i_frame + 1) * n_pis;
        Cex {
            i_po: 0,
            i_frame,
            n_regs,
            n_pis,
            bits: vec![0; n_bits.div_ceil(8).max(1)],
        }
    }

    /// Length-1 trace for an output that is asserted combinationally.
    pub fn trivial(n_regs: usize, n_pis: usize, i_po: usize, i_frame: usize) -> Cex {
        let mut cex = Cex::new(n_regs, n_pis, i_frame);
        cex.i_po = i_po;
        cex
    }

    pub fn n_bits(&self) -> usize {
        self.n_regs + (self.i_frame + 1) * self.n_pis
    }

    pub fn bit(&self, index: usize) -> bool {
        self.bits[index >> 3] >> (index & 7) & 1 != 0
    }

    pub fn set_bit(&mut self, index: usize) {
        self.bits[index >> 3] |= 1 << (index & 7);
    }

    pub fn reg_bit(&self, reg: usize) -> bool {
        self.bit(reg)
    }

    pub fn pi_bit(&self, frame: usize, pi: usize) -> bool {
        self.bit(self.n_regs + frame * self.n_pis + pi)
    }

    /// Replays the trace on the AIG and checks that the target PO is
    /// asserted in the reported frame. Also validates the dimensions.
    pub fn verify(&self, aig: &Aig) -> Result<()> {
        ensure!(self.n_regs == aig.n_regs(), "CEX register count mismatch");
        ensure!(self.n_pis == aig.n_pis(), "CEX input count mismatch");
        ensure!(self.i_po < aig.n_pos(), "CEX output index out of range");
        ensure!(
            self.bits.len() * 8 >= self.n_bits(),
            "CEX bit data too short"
        );
        let mut sim = TernarySim::new(aig.n_objs());
        let mut regs: Vec<bool> = (0..self.n_regs).map(|r| self.reg_bit(r)).collect();
        for frame in 0..=self.i_frame {
            sim.set(0, TER_ZER);
            for pi in 0..self.n_pis {
                let value = if self.pi_bit(frame, pi) { TER_ONE } else { TER_ZER };
                sim.set(aig.pi(pi), value);
            }
            for (reg, &value) in regs.iter().enumerate() {
                sim.set(aig.ro(reg), if value { TER_ONE } else { TER_ZER });
            }
            for id in 1..aig.n_objs() {
                if !aig.is_ci(id) {
                    sim.eval_obj(aig, id);
                }
            }
            if frame == self.i_frame {
                let po = aig.po(self.i_po);
                ensure!(
                    sim.get(po) == TER_ONE,
                    "CEX does not assert output {} in frame {}",
                    self.i_po,
                    self.i_frame
                );
            }
            for reg in 0..self.n_regs {
                regs[reg] = sim.get(aig.ri(reg)) == TER_ONE;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toggle() -> Aig {
        // one flop, next = !q, PO = q
        let mut aig = Aig::start(8);
        let q = aig.append_ci();
        aig.append_co(q);
        aig.append_co(q.compl());
        aig.set_reg_num(1);
        aig
    }

    #[test]
    fn toggle_fails_in_frame_one() {
        let aig = toggle();
        let cex = Cex::new(1, 0, 1);
        cex.verify(&aig).unwrap();
    }

    #[test]
    fn toggle_does_not_fail_in_frame_zero() {
        let aig = toggle();
        let cex = Cex::new(1, 0, 0);
        assert!(cex.verify(&aig).is_err());
    }

    #[test]
    fn pi_assignment_drives_output() {
        // PO = x & y
        let mut aig = Aig::start(8);
        let x = aig.append_ci();
        let y = aig.append_ci();
        let n = aig.append_and(x, y);
        aig.append_co(n);
        let mut cex = Cex::new(0, 2, 0);
        assert!(cex.verify(&aig).is_err());
        cex.set_bit(0);
        cex.set_bit(1);
        cex.verify(&aig).unwrap();
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let aig = toggle();
        let cex = Cex::new(2, 0, 1);
        assert!(cex.verify(&aig).is_err());
    }

    #[test]
    fn bit_packing_is_lsb_first() {
        let mut cex = Cex::new(3, 4, 1);
        cex.set_bit(0);
        cex.set_bit(7);
        cex.set_bit(8);
        assert!(cex.bit(0) && cex.bit(7) && cex.bit(8));
        assert!(!cex.bit(1) && !cex.bit(9));
        assert_eq!(cex.n_bits(), 3 + 2 * 4);
    }
}
