use std::cmp::Ordering;
use std::rc::Rc;

use crate::lit::Lit;

/// An immutable state cube: the conjunction of `lits()[..n_lits]`, kept
/// sorted, with the PI literals recorded by ternary justification as a
/// trailing witness block. The 63-bit signature folds every state
/// literal with `1 << (lit % 63)` and makes most non-subset pairs cheap
/// to reject.
///
/// Cubes are shared by reference counting (`Rc`): frames, obligations and
/// the queue all point at the same allocation.
#[derive(Debug, PartialEq, Eq)]
pub struct Cube {
    sign: u64,
    n_lits: usize,
    lits: Vec<Lit>,
}

impl Cube {
    pub fn new(state_lits: &[Lit], pi_lits: &[Lit]) -> Rc<Cube> {
        let mut lits = state_lits.to_vec();
        lits.sort_unstable();
        let sign = signature(&lits);
        let n_lits = lits.len();
        lits.extend_from_slice(pi_lits);
        Rc::new(Cube { sign, n_lits, lits })
    }

    /// The cube with the state literal at position `remove` dropped; the
    /// PI tail is kept unchanged.
    pub fn without(&self, remove: usize) -> Rc<Cube> {
        assert!(remove < self.n_lits);
        let mut lits = Vec::with_capacity(self.lits.len() - 1);
        lits.extend_from_slice(&self.lits[..remove]);
        lits.extend_from_slice(&self.lits[remove + 1..]);
        let sign = signature(&lits[..self.n_lits - 1]);
        Rc::new(Cube { sign, n_lits: self.n_lits - 1, lits })
    }

    /// A cube over the given subset of this cube's state literals, with
    /// the PI tail carried over.
    pub fn subset(&self, state_lits: &[Lit]) -> Rc<Cube> {
        assert!(state_lits.len() <= self.n_lits);
        Cube::new(state_lits, self.pi_lits())
    }

    pub fn n_lits(&self) -> usize {
        self.n_lits
    }

    pub fn state_lits(&self) -> &[Lit] {
        &self.lits[..self.n_lits]
    }

    pub fn pi_lits(&self) -> &[Lit] {
        &self.lits[self.n_lits..]
    }

    pub fn sign(&self) -> u64 {
        self.sign
    }

    /// True iff every state literal of `other` occurs in `self`. The
    /// signature prefilter rejects most failures without scanning.
    pub fn contains(&self, other: &Cube) -> bool {
        if self.n_lits < other.n_lits {
            return false;
        }
        if self.sign & other.sign != other.sign {
            return false;
        }
        let mut mine = self.state_lits().iter().rev();
        'outer: for lit in other.state_lits().iter().rev() {
            for candidate in mine.by_ref() {
                match candidate.cmp(lit) {
                    Ordering::Equal => continue 'outer,
                    Ordering::Greater => continue,
                    Ordering::Less => return false,
                }
            }
            return false;
        }
        true
    }

    /// True iff the cube covers the all-zero initial state, i.e. every
    /// state literal is negative. `skip` excludes one position, which the
    /// literal-dropping loop uses to test a cube with a hole.
    pub fn is_init(&self, skip: Option<usize>) -> bool {
        self.state_lits()
            .iter()
            .enumerate()
            .all(|(i, lit)| Some(i) == skip || lit.sign())
    }

    /// Frame ordering: lexicographic on the state literals, larger
    /// literal first, longer cube first on a shared prefix.
    pub fn compare(&self, other: &Cube) -> Ordering {
        for (a, b) in self.state_lits().iter().zip(other.state_lits()) {
            match b.cmp(a) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        other.n_lits.cmp(&self.n_lits)
    }
}

fn signature(state_lits: &[Lit]) -> u64 {
    state_lits
        .iter()
        .fold(0, |sign, lit| sign | 1u64 << (lit.into_raw() % 63))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(lits: &[(usize, bool)]) -> Rc<Cube> {
        let lits: Vec<Lit> = lits.iter().map(|&(v, c)| Lit::new(v, c)).collect();
        Cube::new(&lits, &[])
    }

    #[test]
    fn literals_are_sorted_and_signed() {
        let c = cube(&[(5, true), (1, false), (3, false)]);
        let raw: Vec<u32> = c.state_lits().iter().map(|l| l.into_raw()).collect();
        assert_eq!(raw, vec![2, 6, 11]);
        assert_eq!(c.sign(), 1 << 2 | 1 << 6 | 1 << 11);
    }

    #[test]
    fn containment_is_subset_of_state_literals() {
        let big = cube(&[(1, false), (2, true), (4, false)]);
        let small = cube(&[(1, false), (4, false)]);
        let other = cube(&[(1, true)]);
        assert!(big.contains(&small));
        assert!(big.contains(&big));
        assert!(!small.contains(&big));
        assert!(!big.contains(&other));
        // transitivity on a chain
        let tiny = cube(&[(4, false)]);
        assert!(small.contains(&tiny));
        assert!(big.contains(&tiny));
    }

    #[test]
    fn signature_prefilter_is_sound() {
        // equal signatures modulo 63: literal 0 and literal 63 collide,
        // containment must still answer correctly
        let a = cube(&[(0, false)]);
        let b = Cube::new(&[Lit::from_raw(63)], &[]);
        assert_eq!(a.sign(), b.sign());
        assert!(!a.contains(&b));
        assert!(!b.contains(&a));
    }

    #[test]
    fn is_init_checks_polarity() {
        assert!(cube(&[(0, true), (3, true)]).is_init(None));
        assert!(!cube(&[(0, true), (3, false)]).is_init(None));
        assert!(cube(&[(0, true), (3, false)]).is_init(Some(1)));
        // dropping the only positive literal leaves the init state inside
        let single = cube(&[(2, false)]);
        assert!(single.is_init(Some(0)));
        assert!(!single.is_init(None));
    }

    #[test]
    fn without_removes_one_literal() {
        let c = cube(&[(1, false), (2, true), (4, false)]);
        let d = c.without(1);
        assert_eq!(d.n_lits(), 2);
        assert!(c.contains(&d));
        assert!(!d.contains(&c));
    }

    #[test]
    fn subset_keeps_pi_tail() {
        let pi = [Lit::new(0, false), Lit::new(1, true)];
        let c = Cube::new(&[Lit::new(2, false), Lit::new(3, false)], &pi);
        let d = c.subset(&[Lit::new(3, false)]);
        assert_eq!(d.pi_lits(), &pi);
        assert_eq!(d.n_lits(), 1);
    }

    #[test]
    fn compare_orders_largest_literal_first() {
        let a = cube(&[(3, false)]);
        let b = cube(&[(2, false)]);
        assert_eq!(a.compare(&b), Ordering::Less);
        // smaller leading literal sorts later
        let long = cube(&[(3, false), (1, false)]);
        assert_eq!(a.compare(&long), Ordering::Less);
        // on a shared prefix the longer cube comes first
        let extended = cube(&[(3, false), (5, false)]);
        assert_eq!(extended.compare(&a), Ordering::Less);
        assert_eq!(a.compare(&a), Ordering::Equal);
    }
}
