use super::Aig;
use crate::lit::Lit;

/// Representative sentinel: the object belongs to no class.
pub const REPR_VOID: u32 = 0x0FFF_FFFF;

const REPR_MASK: u32 = 0x0FFF_FFFF;
const BIT_PROVED: u32 = 1 << 28;
const BIT_FAILED: u32 = 1 << 29;

/// Packed per-object class record: a 28-bit representative index plus
/// proved/failed flags. Representative 0 is the constant class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Repr(u32);

impl Repr {
    pub fn none() -> Repr {
        Repr(REPR_VOID)
    }
    pub fn new(repr: usize, proved: bool) -> Repr {
        debug_assert!((repr as u32) <= REPR_VOID);
        Repr(repr as u32 | (proved as u32) << 28)
    }
    pub fn repr(self) -> u32 {
        self.0 & REPR_MASK
    }
    pub fn proved(self) -> bool {
        self.0 & BIT_PROVED != 0
    }
    pub fn failed(self) -> bool {
        self.0 & BIT_FAILED != 0
    }
    pub fn set_proved(&mut self, p: bool) {
        self.0 = (self.0 & !BIT_PROVED) | (p as u32) << 28;
    }
    pub fn set_failed(&mut self, f: bool) {
        self.0 = (self.0 & !BIT_FAILED) | (f as u32) << 29;
    }
}

/// Equivalence classes over CIs and AND nodes. `reprs[i]` points at the
/// class head (an index `< i`, or 0 for the constant class); `nexts[i]`
/// links members in ascending index order, 0 terminating the chain.
impl Aig {
    pub fn equiv_start(&mut self) {
        self.reprs = Some(vec![Repr::none(); self.n_objs()]);
        self.nexts = Some(vec![0; self.n_objs()]);
    }

    pub fn equiv_stop(&mut self) {
        self.reprs = None;
        self.nexts = None;
    }

    pub fn has_equivs(&self) -> bool {
        self.reprs.is_some()
    }

    pub fn obj_repr(&self, id: usize) -> u32 {
        self.reprs.as_ref().expect("no equivalence data")[id].repr()
    }

    pub fn set_obj_repr(&mut self, id: usize, repr: Repr) {
        self.reprs.as_mut().expect("no equivalence data")[id] = repr;
    }

    pub fn obj_proved(&self, id: usize) -> bool {
        self.reprs.as_ref().expect("no equivalence data")[id].proved()
    }

    pub fn obj_next(&self, id: usize) -> usize {
        self.nexts.as_ref().expect("no equivalence data")[id]
    }

    /// Member of the constant-zero class.
    pub fn obj_is_const_class(&self, id: usize) -> bool {
        self.obj_repr(id) == 0
    }

    /// Head of a (non-constant) class.
    pub fn obj_is_head(&self, id: usize) -> bool {
        self.obj_repr(id) == REPR_VOID && self.obj_next(id) > 0
    }

    /// Last member of its class.
    pub fn obj_is_tail(&self, id: usize) -> bool {
        let r = self.obj_repr(id);
        r > 0 && r != REPR_VOID && self.obj_next(id) == 0
    }

    /// Not in any class.
    pub fn obj_is_none(&self, id: usize) -> bool {
        self.obj_repr(id) == REPR_VOID && self.obj_next(id) == 0
    }

    /// Iterates a class from its head through the `next` chain.
    pub fn class_iter(&self, head: usize) -> ClassIter<'_> {
        assert!(self.obj_is_head(head));
        ClassIter { aig: self, cur: head }
    }

    /// Iterates the heads of all non-constant classes.
    pub fn class_heads(&self) -> impl Iterator<Item = usize> + '_ {
        (1..self.n_objs()).filter(move |&id| self.obj_is_head(id))
    }

    /// Members of the constant class, ascending.
    pub fn const_class(&self) -> impl Iterator<Item = usize> + '_ {
        (1..self.n_objs()).filter(move |&id| self.obj_is_const_class(id))
    }

    /// Rebuilds the `next` chains from the representative table in one
    /// ascending pass.
    pub fn derive_nexts(&mut self) {
        let n = self.n_objs();
        let reprs = self.reprs.as_ref().expect("no equivalence data");
        let mut nexts = vec![0usize; n];
        let mut tails: Vec<usize> = (0..n).collect();
        for id in 1..n {
            let r = reprs[id].repr();
            if r == REPR_VOID || r == 0 {
                continue;
            }
            let r = r as usize;
            nexts[tails[r]] = id;
            tails[r] = id;
        }
        self.nexts = Some(nexts);
    }

    pub fn equiv_count_classes(&self) -> usize {
        self.class_heads().count()
    }

    pub fn equiv_count_lits(&self) -> usize {
        let mut count = self.const_class().count();
        for head in self.class_heads() {
            count += self.class_iter(head).count() - 1;
        }
        count
    }

    fn equiv_reduce_rec(&mut self, new: &mut Aig, id: usize) {
        if self.obj(id).value() != u32::MAX {
            return;
        }
        assert!(self.is_and(id));
        let repr = self.obj_repr(id);
        if repr != REPR_VOID && (repr as usize) < id {
            let repr = repr as usize;
            self.equiv_reduce_rec_entry(new, repr);
            let lit = Lit::from_raw(self.obj(repr).value())
                .compl_if(self.obj(id).phase() ^ self.obj(repr).phase());
            self.obj_mut(id).set_value(lit.into_raw());
            return;
        }
        self.equiv_reduce_rec(new, self.fanin0(id));
        self.equiv_reduce_rec(new, self.fanin1(id));
        let c0 = Lit::from_raw(self.obj(self.fanin0(id)).value())
            .compl_if(self.obj(id).compl0());
        let c1 = Lit::from_raw(self.obj(self.fanin1(id)).value())
            .compl_if(self.obj(id).compl1());
        let lit = new.hash_and(c0, c1);
        self.obj_mut(id).set_value(lit.into_raw());
    }

    fn equiv_reduce_rec_entry(&mut self, new: &mut Aig, id: usize) {
        if self.obj(id).value() == u32::MAX && self.is_and(id) {
            self.equiv_reduce_rec(new, id);
        }
    }

    /// Rewrites the AIG so that every class member is replaced by its
    /// representative (phase-adjusted), hashing the surviving nodes.
    pub fn equiv_reduce(&mut self) -> Aig {
        assert!(self.reprs.is_some(), "equiv_reduce: no equivalence data");
        let mut new = Aig::start(self.n_objs());
        new.name = self.name.clone();
        self.fill_value(u32::MAX);
        self.obj_mut(0).set_value(Lit::FALSE.into_raw());
        for i in 0..self.n_cis() {
            let ci = self.ci(i);
            let lit = new.append_ci();
            self.obj_mut(ci).set_value(lit.into_raw());
        }
        // members of the constant class collapse to the constant
        for id in 1..self.n_objs() {
            if self.has_equivs() && !self.is_co(id) && self.obj_is_const_class(id) {
                let lit = Lit::FALSE.compl_if(self.obj(id).phase());
                self.obj_mut(id).set_value(lit.into_raw());
            }
        }
        for i in 0..self.n_cos() {
            let co = self.co(i);
            self.equiv_reduce_rec_entry(&mut new, self.fanin0(co));
            let c0 = Lit::from_raw(self.obj(self.fanin0(co)).value())
                .compl_if(self.obj(co).compl0());
            let lit = new.append_co(c0);
            self.obj_mut(co).set_value(lit.into_raw());
        }
        new.hash_stop();
        new.set_reg_num(self.n_regs());
        new
    }

    /// Carries the equivalence relation through a duplication: every old
    /// id is translated by the fresh literal left in its scratch word.
    pub(crate) fn remap_equiv_into(&self, new: &mut Aig) {
        let Some(reprs) = &self.reprs else {
            return;
        };
        let mut new_reprs = vec![Repr::none(); new.n_objs()];
        for (id, rp) in reprs.iter().enumerate() {
            let r = rp.repr();
            if r == REPR_VOID {
                continue;
            }
            if self.obj(id).value() == u32::MAX {
                continue;
            }
            let new_id = Lit::from_raw(self.obj(id).value()).var();
            let new_repr = if r == 0 {
                0
            } else {
                if self.obj(r as usize).value() == u32::MAX {
                    continue;
                }
                Lit::from_raw(self.obj(r as usize).value()).var()
            };
            if new_repr < new_id {
                new_reprs[new_id] = Repr::new(new_repr, rp.proved());
            }
        }
        new.reprs = Some(new_reprs);
        new.derive_nexts();
    }
}

pub struct ClassIter<'a> {
    aig: &'a Aig,
    cur: usize,
}

impl Iterator for ClassIter<'_> {
    type Item = usize;
    fn next(&mut self) -> Option<usize> {
        if self.cur == 0 {
            return None;
        }
        let id = self.cur;
        self.cur = self.aig.obj_next(id);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_classes() -> Aig {
        // two structurally equal ANDs plus one AND equal to constant 0
        let mut aig = Aig::start(16);
        let a = aig.append_ci();
        let b = aig.append_ci();
        let n1 = aig.append_and(a, b);
        let n2 = aig.append_and(a, b);
        let n3 = aig.append_and(a, a.compl());
        aig.append_co(n1);
        aig.append_co(n2);
        aig.append_co(n3);
        aig.equiv_start();
        aig.set_obj_repr(n2.var(), Repr::new(n1.var(), true));
        aig.set_obj_repr(n3.var(), Repr::new(0, false));
        aig.derive_nexts();
        aig
    }

    #[test]
    fn class_structure() {
        let aig = with_classes();
        let n1 = 3;
        let n2 = 4;
        let n3 = 5;
        assert!(aig.obj_is_head(n1));
        assert!(aig.obj_is_tail(n2));
        assert!(aig.obj_is_const_class(n3));
        assert_eq!(aig.class_iter(n1).collect::<Vec<_>>(), vec![n1, n2]);
        assert_eq!(aig.equiv_count_classes(), 1);
        assert_eq!(aig.equiv_count_lits(), 2);
    }

    #[test]
    fn derive_nexts_orders_members_ascending() {
        let mut aig = Aig::start(16);
        let a = aig.append_ci();
        let b = aig.append_ci();
        let n1 = aig.append_and(a, b);
        let n2 = aig.append_and(a, b);
        let n3 = aig.append_and(a, b);
        aig.append_co(n3);
        aig.equiv_start();
        aig.set_obj_repr(n2.var(), Repr::new(n1.var(), false));
        aig.set_obj_repr(n3.var(), Repr::new(n1.var(), false));
        aig.derive_nexts();
        assert_eq!(
            aig.class_iter(n1.var()).collect::<Vec<_>>(),
            vec![n1.var(), n2.var(), n3.var()]
        );
    }

    #[test]
    fn reduce_by_equivalence_collapses_members() {
        let mut aig = with_classes();
        let reduced = aig.equiv_reduce();
        // n2 folded into n1, n3 folded into the constant
        assert_eq!(reduced.n_ands(), 1);
        assert_eq!(reduced.n_cos(), 3);
        let co1 = reduced.co(1);
        let co0 = reduced.co(0);
        assert_eq!(reduced.child0(co0), reduced.child0(co1));
        let co2 = reduced.co(2);
        assert!(reduced.child0(co2).is_const());
    }
}
