use anyhow::{anyhow, Result};

pub mod dfs;
pub mod dup;
pub mod equiv;
pub mod tsim;

use crate::lit::Lit;

pub use dup::miter;
use equiv::Repr;

/// Fanin-delta sentinel for objects without that fanin (CIs, constant).
pub(crate) const DIFF_NONE: u32 = 0x1FFF_FFFF;

const DIFF_MASK: u32 = 0x1FFF_FFFF;
const BIT_COMPL: u32 = 1 << 29;
const BIT_MARK: u32 = 1 << 30;
// w0 bit 31 is the terminal flag, w1 bit 31 the precomputed phase
const BIT_AUX: u32 = 1 << 31;

/// One packed AIG object: two 29-bit fanin deltas with complement bits,
/// two user marks, the terminal flag, the all-zero-input phase, and a
/// 32-bit scratch word that doubles as the traversal stamp.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AigObj {
    w0: u32,
    w1: u32,
    value: u32,
}

impl AigObj {
    fn diff0(&self) -> u32 {
        self.w0 & DIFF_MASK
    }
    fn diff1(&self) -> u32 {
        self.w1 & DIFF_MASK
    }
    fn set_diff0(&mut self, d: u32) {
        debug_assert!(d <= DIFF_NONE);
        self.w0 = (self.w0 & !DIFF_MASK) | d;
    }
    fn set_diff1(&mut self, d: u32) {
        debug_assert!(d <= DIFF_NONE);
        self.w1 = (self.w1 & !DIFF_MASK) | d;
    }
    pub fn compl0(&self) -> bool {
        self.w0 & BIT_COMPL != 0
    }
    pub fn compl1(&self) -> bool {
        self.w1 & BIT_COMPL != 0
    }
    fn set_compl0(&mut self, c: bool) {
        self.w0 = (self.w0 & !BIT_COMPL) | (c as u32) << 29;
    }
    fn set_compl1(&mut self, c: bool) {
        self.w1 = (self.w1 & !BIT_COMPL) | (c as u32) << 29;
    }
    pub fn mark0(&self) -> bool {
        self.w0 & BIT_MARK != 0
    }
    pub fn mark1(&self) -> bool {
        self.w1 & BIT_MARK != 0
    }
    pub fn set_mark0(&mut self, m: bool) {
        self.w0 = (self.w0 & !BIT_MARK) | (m as u32) << 30;
    }
    pub fn set_mark1(&mut self, m: bool) {
        self.w1 = (self.w1 & !BIT_MARK) | (m as u32) << 30;
    }
    fn is_term(&self) -> bool {
        self.w0 & BIT_AUX != 0
    }
    fn set_term(&mut self) {
        self.w0 |= BIT_AUX;
    }
    pub fn phase(&self) -> bool {
        self.w1 & BIT_AUX != 0
    }
    fn set_phase(&mut self, ph: bool) {
        self.w1 = (self.w1 & !BIT_AUX) | (ph as u32) << 31;
    }
    pub fn value(&self) -> u32 {
        self.value
    }
    pub fn set_value(&mut self, v: u32) {
        self.value = v;
    }
}

/// The AIG manager: a packed object store addressed by index, with CI/CO
/// vectors, an optional structural-hash table, optional fanout lists and
/// optional equivalence-class tables.
///
/// Object 0 is the constant zero. Indices are stable for the lifetime of
/// the manager; the store grows by doubling and never relocates ids.
pub struct Aig {
    pub name: Option<String>,
    objs: Vec<AigObj>,
    cis: Vec<usize>,
    cos: Vec<usize>,
    n_regs: usize,
    // strash table: object ids, 0 marks an empty slot
    table: Vec<u32>,
    table_used: usize,
    n_trav_ids: u32,
    fanouts: Option<Vec<Vec<usize>>>,
    pub(crate) reprs: Option<Vec<Repr>>,
    pub(crate) nexts: Option<Vec<usize>>,
    /// LUT mapping records carried through AIGER (fanins, root), if any.
    pub mapping: Option<Vec<(Vec<usize>, usize)>>,
    /// Raw packing section carried through AIGER, if any.
    pub packing: Option<Vec<u32>>,
    /// Symbol-table names, positionally per CI/CO (empty when unnamed).
    pub ci_names: Option<Vec<String>>,
    pub co_names: Option<Vec<String>>,
}

impl Aig {
    /// Starts a manager with object 0 as the constant zero.
    pub fn start(capacity: usize) -> Aig {
        let mut objs = Vec::with_capacity(capacity.max(1));
        let mut zero = AigObj::default();
        zero.set_diff0(DIFF_NONE);
        zero.set_diff1(DIFF_NONE);
        objs.push(zero);
        Aig {
            name: None,
            objs,
            cis: Vec::new(),
            cos: Vec::new(),
            n_regs: 0,
            table: Vec::new(),
            table_used: 0,
            n_trav_ids: 1,
            fanouts: None,
            reprs: None,
            nexts: None,
            mapping: None,
            packing: None,
            ci_names: None,
            co_names: None,
        }
    }

    // object counts

    pub fn n_objs(&self) -> usize {
        self.objs.len()
    }
    pub fn n_cis(&self) -> usize {
        self.cis.len()
    }
    pub fn n_cos(&self) -> usize {
        self.cos.len()
    }
    pub fn n_regs(&self) -> usize {
        self.n_regs
    }
    pub fn n_pis(&self) -> usize {
        self.cis.len() - self.n_regs
    }
    pub fn n_pos(&self) -> usize {
        self.cos.len() - self.n_regs
    }
    pub fn n_ands(&self) -> usize {
        self.objs.len() - self.cis.len() - self.cos.len() - 1
    }

    /// Declares the last `n_regs` CI/CO pairs to be registers.
    pub fn set_reg_num(&mut self, n_regs: usize) {
        assert!(n_regs <= self.cis.len() && n_regs <= self.cos.len());
        self.n_regs = n_regs;
    }

    // indexed access

    pub fn obj(&self, id: usize) -> &AigObj {
        &self.objs[id]
    }
    pub fn obj_mut(&mut self, id: usize) -> &mut AigObj {
        &mut self.objs[id]
    }
    pub fn ci(&self, i: usize) -> usize {
        self.cis[i]
    }
    pub fn co(&self, i: usize) -> usize {
        self.cos[i]
    }
    pub fn pi(&self, i: usize) -> usize {
        assert!(i < self.n_pis());
        self.cis[i]
    }
    pub fn po(&self, i: usize) -> usize {
        assert!(i < self.n_pos());
        self.cos[i]
    }
    /// Register output (a CI) of the i-th flop.
    pub fn ro(&self, i: usize) -> usize {
        assert!(i < self.n_regs);
        self.cis[self.n_pis() + i]
    }
    /// Register input (a CO) of the i-th flop.
    pub fn ri(&self, i: usize) -> usize {
        assert!(i < self.n_regs);
        self.cos[self.n_pos() + i]
    }

    pub fn cis(&self) -> &[usize] {
        &self.cis
    }
    pub fn cos(&self) -> &[usize] {
        &self.cos
    }

    // predicates

    pub fn is_const0(&self, id: usize) -> bool {
        id == 0
    }
    pub fn is_ci(&self, id: usize) -> bool {
        let o = &self.objs[id];
        o.is_term() && o.diff0() == DIFF_NONE
    }
    pub fn is_co(&self, id: usize) -> bool {
        let o = &self.objs[id];
        o.is_term() && o.diff0() != DIFF_NONE
    }
    pub fn is_and(&self, id: usize) -> bool {
        let o = &self.objs[id];
        !o.is_term() && o.diff0() != DIFF_NONE
    }
    /// CI/CO positional index (PI/PO/flop slot in the CI/CO vector).
    pub fn cio_id(&self, id: usize) -> usize {
        assert!(self.objs[id].is_term());
        self.objs[id].diff1() as usize
    }
    pub fn is_pi(&self, id: usize) -> bool {
        self.is_ci(id) && self.cio_id(id) < self.n_pis()
    }
    pub fn is_po(&self, id: usize) -> bool {
        self.is_co(id) && self.cio_id(id) < self.n_pos()
    }
    pub fn is_ro(&self, id: usize) -> bool {
        self.is_ci(id) && self.cio_id(id) >= self.n_pis()
    }
    pub fn is_ri(&self, id: usize) -> bool {
        self.is_co(id) && self.cio_id(id) >= self.n_pos()
    }
    /// Flop index of a register output.
    pub fn ro_index(&self, id: usize) -> usize {
        assert!(self.is_ro(id));
        self.cio_id(id) - self.n_pis()
    }
    /// Flop index of a register input.
    pub fn ri_index(&self, id: usize) -> usize {
        assert!(self.is_ri(id));
        self.cio_id(id) - self.n_pos()
    }
    pub fn ro_to_ri(&self, id: usize) -> usize {
        self.ri(self.ro_index(id))
    }
    pub fn ri_to_ro(&self, id: usize) -> usize {
        self.ro(self.ri_index(id))
    }

    // fanins

    pub fn fanin0(&self, id: usize) -> usize {
        id - self.objs[id].diff0() as usize
    }
    pub fn fanin1(&self, id: usize) -> usize {
        id - self.objs[id].diff1() as usize
    }
    /// First fanin as a literal (complement applied).
    pub fn child0(&self, id: usize) -> Lit {
        Lit::new(self.fanin0(id), self.objs[id].compl0())
    }
    /// Second fanin as a literal (complement applied).
    pub fn child1(&self, id: usize) -> Lit {
        Lit::new(self.fanin1(id), self.objs[id].compl1())
    }

    /// Phase of a literal: the value under the all-zero input assignment.
    pub fn lit_phase(&self, lit: Lit) -> bool {
        self.objs[lit.var()].phase() ^ lit.sign()
    }

    // construction

    fn append_obj(&mut self) -> usize {
        if self.objs.len() == self.objs.capacity() {
            self.objs.reserve(self.objs.len());
        }
        self.objs.push(AigObj::default());
        self.objs.len() - 1
    }

    /// Appends a combinational input, returning its positive literal.
    pub fn append_ci(&mut self) -> Lit {
        let id = self.append_obj();
        let cio = self.cis.len() as u32;
        let obj = &mut self.objs[id];
        obj.set_term();
        obj.set_diff0(DIFF_NONE);
        obj.set_diff1(cio);
        self.cis.push(id);
        if let Some(fans) = &mut self.fanouts {
            fans.push(Vec::new());
        }
        Lit::positive(id)
    }

    /// Appends a 2-input AND node, returning its positive literal.
    ///
    /// Fanins are stored in canonical order (smaller literal first), which
    /// structural hashing relies on. Equal fanins are a caller error.
    pub fn append_and(&mut self, lit0: Lit, lit1: Lit) -> Lit {
        assert!(lit0 != lit1, "append_and: equal fanins");
        assert!(lit0.var() < self.objs.len() && lit1.var() < self.objs.len());
        let (lit0, lit1) = if lit0 < lit1 { (lit0, lit1) } else { (lit1, lit0) };
        let id = self.append_obj();
        let phase = self.lit_phase(lit0) & self.lit_phase(lit1);
        let obj = &mut self.objs[id];
        obj.set_diff0((id - lit0.var()) as u32);
        obj.set_compl0(lit0.sign());
        obj.set_diff1((id - lit1.var()) as u32);
        obj.set_compl1(lit1.sign());
        obj.set_phase(phase);
        if let Some(fans) = &mut self.fanouts {
            fans.push(Vec::new());
            fans[lit0.var()].push(id);
            fans[lit1.var()].push(id);
        }
        Lit::positive(id)
    }

    /// Appends a combinational output driven by `lit`.
    pub fn append_co(&mut self, lit: Lit) -> Lit {
        assert!(lit.var() < self.objs.len());
        let id = self.append_obj();
        let cio = self.cos.len() as u32;
        let phase = self.lit_phase(lit);
        let obj = &mut self.objs[id];
        obj.set_term();
        obj.set_diff0((id - lit.var()) as u32);
        obj.set_compl0(lit.sign());
        obj.set_diff1(cio);
        obj.set_phase(phase);
        self.cos.push(id);
        if let Some(fans) = &mut self.fanouts {
            fans.push(Vec::new());
            fans[lit.var()].push(id);
        }
        Lit::positive(id)
    }

    // structural hashing

    fn hash_key(lit0: Lit, lit1: Lit, mask: usize) -> usize {
        let h = lit0.into_raw() as u64 * 7937 + lit1.into_raw() as u64 * 2971;
        (h.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32) as usize & mask
    }

    /// Allocates (or clears) the structural-hash table and fills it from
    /// the existing AND nodes.
    pub fn hash_start(&mut self) {
        let cap = (2 * self.objs.len()).next_power_of_two().max(256);
        self.table = vec![0; cap];
        self.table_used = 0;
        for id in 1..self.objs.len() {
            if self.is_and(id) {
                self.table_insert(id);
            }
        }
    }

    pub fn hash_stop(&mut self) {
        self.table = Vec::new();
        self.table_used = 0;
    }

    fn table_insert(&mut self, id: usize) {
        if 2 * (self.table_used + 1) >= self.table.len() {
            self.table_grow();
        }
        let mask = self.table.len() - 1;
        let mut slot = Self::hash_key(self.child0(id), self.child1(id), mask);
        while self.table[slot] != 0 {
            slot = (slot + 1) & mask;
        }
        self.table[slot] = id as u32;
        self.table_used += 1;
    }

    fn table_grow(&mut self) {
        let cap = (self.table.len() * 2).max(256);
        let old = std::mem::replace(&mut self.table, vec![0; cap]);
        self.table_used = 0;
        for id in old {
            if id != 0 {
                self.table_insert(id as usize);
            }
        }
    }

    fn table_lookup(&self, lit0: Lit, lit1: Lit) -> Option<usize> {
        if self.table.is_empty() {
            return None;
        }
        let mask = self.table.len() - 1;
        let mut slot = Self::hash_key(lit0, lit1, mask);
        while self.table[slot] != 0 {
            let id = self.table[slot] as usize;
            if self.child0(id) == lit0 && self.child1(id) == lit1 {
                return Some(id);
            }
            slot = (slot + 1) & mask;
        }
        None
    }

    /// Hash-consed AND with the standard Boolean simplifications.
    pub fn hash_and(&mut self, lit0: Lit, lit1: Lit) -> Lit {
        if lit0 == lit1 {
            return lit0;
        }
        if lit0 == lit1.compl() {
            return Lit::FALSE;
        }
        if lit0 == Lit::FALSE || lit1 == Lit::FALSE {
            return Lit::FALSE;
        }
        if lit0 == Lit::TRUE {
            return lit1;
        }
        if lit1 == Lit::TRUE {
            return lit0;
        }
        let (lit0, lit1) = if lit0 < lit1 { (lit0, lit1) } else { (lit1, lit0) };
        if self.table.is_empty() {
            self.hash_start();
        }
        if let Some(id) = self.table_lookup(lit0, lit1) {
            return Lit::positive(id);
        }
        let lit = self.append_and(lit0, lit1);
        self.table_insert(lit.var());
        lit
    }

    pub fn hash_xor(&mut self, lit0: Lit, lit1: Lit) -> Lit {
        let f = self.hash_and(lit0, lit1.compl());
        let g = self.hash_and(lit0.compl(), lit1);
        self.hash_and(f.compl(), g.compl()).compl()
    }

    pub fn hash_mux(&mut self, ctrl: Lit, data1: Lit, data0: Lit) -> Lit {
        let f = self.hash_and(ctrl, data1);
        let g = self.hash_and(ctrl.compl(), data0);
        self.hash_and(f.compl(), g.compl()).compl()
    }

    // traversal ids

    /// Bumps the traversal counter; objects stamped with the new id count
    /// as visited in the current walk.
    pub fn trav_inc(&mut self) -> u32 {
        self.n_trav_ids += 1;
        self.n_trav_ids
    }

    pub fn trav_set_current(&mut self, id: usize) {
        self.objs[id].value = self.n_trav_ids;
    }

    pub fn trav_is_current(&self, id: usize) -> bool {
        self.objs[id].value == self.n_trav_ids
    }

    /// Fills the scratch word of every object, resetting traversal state.
    pub fn fill_value(&mut self, value: u32) {
        for obj in &mut self.objs {
            obj.value = value;
        }
        self.n_trav_ids = 1;
    }

    pub fn clean_marks(&mut self) {
        for obj in &mut self.objs {
            obj.set_mark0(false);
            obj.set_mark1(false);
        }
    }

    // fanout lists

    /// Starts fanout bookkeeping; subsequent appends maintain it.
    pub fn fanout_start(&mut self) {
        let mut fans = vec![Vec::new(); self.objs.len()];
        for id in 1..self.objs.len() {
            if self.is_and(id) {
                fans[self.fanin0(id)].push(id);
                fans[self.fanin1(id)].push(id);
            } else if self.is_co(id) {
                fans[self.fanin0(id)].push(id);
            }
        }
        self.fanouts = Some(fans);
    }

    pub fn fanout_stop(&mut self) {
        self.fanouts = None;
    }

    pub fn has_fanouts(&self) -> bool {
        self.fanouts.is_some()
    }

    pub fn fanouts(&self, id: usize) -> &[usize] {
        self.fanouts
            .as_ref()
            .expect("fanout data not started")[id]
            .as_slice()
    }

    // validation

    /// Checks the topological invariant: both fanins of every AND and the
    /// driver of every CO have strictly smaller indices.
    pub fn check_topo_order(&self) -> Result<()> {
        for id in 1..self.objs.len() {
            if self.is_and(id) {
                let (f0, f1) = (self.fanin0(id), self.fanin1(id));
                if f0 >= id || f1 >= id {
                    return Err(anyhow!("AND {id} has a non-topological fanin"));
                }
                if self.child0(id) >= self.child1(id) {
                    return Err(anyhow!("AND {id} fanins are not canonical"));
                }
            } else if self.is_co(id) && self.fanin0(id) >= id {
                return Err(anyhow!("CO {id} has a non-topological driver"));
            }
        }
        Ok(())
    }

    /// True iff objects are laid out CIs first, then ANDs, then COs.
    pub fn is_normalized(&self) -> bool {
        let n_cis = self.cis.len();
        let n_cos = self.cos.len();
        let n_objs = self.objs.len();
        (1..=n_cis).all(|id| self.is_ci(id) && self.cio_id(id) == id - 1)
            && (n_objs - n_cos..n_objs).all(|id| self.is_co(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_topology() {
        let mut aig = Aig::start(16);
        let a = aig.append_ci();
        let b = aig.append_ci();
        let n = aig.append_and(b.compl(), a);
        let o = aig.append_co(n);
        aig.check_topo_order().unwrap();
        assert!(aig.is_and(n.var()));
        assert!(aig.is_co(o.var()));
        // canonical order: smaller literal lands in fanin0
        assert_eq!(aig.child0(n.var()), a);
        assert_eq!(aig.child1(n.var()), b.compl());
        assert_eq!(aig.n_ands(), 1);
    }

    #[test]
    fn hash_and_is_idempotent_and_commutative() {
        let mut aig = Aig::start(16);
        let a = aig.append_ci();
        let b = aig.append_ci();
        let n1 = aig.hash_and(a, b);
        let n2 = aig.hash_and(a, b);
        let n3 = aig.hash_and(b, a);
        assert_eq!(n1, n2);
        assert_eq!(n1, n3);
        assert_eq!(aig.n_ands(), 1);
    }

    #[test]
    fn hash_and_simplifies() {
        let mut aig = Aig::start(16);
        let a = aig.append_ci();
        assert_eq!(aig.hash_and(a, a), a);
        assert_eq!(aig.hash_and(a, a.compl()), Lit::FALSE);
        assert_eq!(aig.hash_and(a, Lit::FALSE), Lit::FALSE);
        assert_eq!(aig.hash_and(a, Lit::TRUE), a);
        assert_eq!(aig.n_ands(), 0);
    }

    #[test]
    fn hash_xor_truth_table() {
        let mut aig = Aig::start(16);
        let a = aig.append_ci();
        let b = aig.append_ci();
        let x = aig.hash_xor(a, b);
        // phase under all-zero inputs: 0 ^ 0 == 0
        assert!(!aig.lit_phase(x));
        let y = aig.hash_xor(a, b.compl());
        assert!(aig.lit_phase(y));
    }

    #[test]
    fn phase_is_all_zero_evaluation() {
        let mut aig = Aig::start(16);
        let a = aig.append_ci();
        let b = aig.append_ci();
        let n = aig.append_and(a.compl(), b.compl());
        assert!(aig.lit_phase(n));
        assert!(!aig.lit_phase(n.compl()));
        let o = aig.append_co(n);
        assert!(aig.obj(o.var()).phase());
    }

    #[test]
    fn fanout_lists_track_appends() {
        let mut aig = Aig::start(16);
        let a = aig.append_ci();
        aig.fanout_start();
        let b = aig.append_ci();
        let n = aig.append_and(a, b);
        let o = aig.append_co(n);
        assert_eq!(aig.fanouts(a.var()), &[n.var()]);
        assert_eq!(aig.fanouts(b.var()), &[n.var()]);
        assert_eq!(aig.fanouts(n.var()), &[o.var()]);
    }

    #[test]
    fn registers_map_between_ro_and_ri() {
        let mut aig = Aig::start(16);
        let _pi = aig.append_ci();
        let q = aig.append_ci();
        let _po = aig.append_co(q);
        let ri = aig.append_co(q.compl());
        aig.set_reg_num(1);
        assert!(aig.is_ro(q.var()));
        assert!(aig.is_ri(ri.var()));
        assert_eq!(aig.ro_to_ri(q.var()), ri.var());
        assert_eq!(aig.ri_to_ro(ri.var()), q.var());
        assert_eq!(aig.n_pis(), 1);
        assert_eq!(aig.n_pos(), 1);
    }
}
