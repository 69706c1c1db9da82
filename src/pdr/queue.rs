use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use super::cube::Cube;

/// A proof obligation: "show that `state` cannot be reached in fewer
/// than `frame` steps". The `next` link chains towards the bad state,
/// strictly frame-older to frame-newer, so a frame-0 obligation carries
/// the whole counter-example trace behind it.
#[derive(Debug)]
pub struct Obligation {
    pub frame: usize,
    pub prio: i64,
    pub state: Rc<Cube>,
    pub next: Option<Rc<Obligation>>,
}

impl Obligation {
    pub fn new(
        frame: usize,
        prio: i64,
        state: Rc<Cube>,
        next: Option<Rc<Obligation>>,
    ) -> Rc<Obligation> {
        Rc::new(Obligation { frame, prio, state, next })
    }

    /// Length of the predecessor chain including this obligation.
    pub fn chain_len(self: &Rc<Obligation>) -> usize {
        let mut len = 0;
        let mut cursor = Some(self);
        while let Some(obl) = cursor {
            len += 1;
            cursor = obl.next.as_ref();
        }
        len
    }
}

struct QueueEntry {
    frame: usize,
    prio: i64,
    seq: u64,
    obl: Rc<Obligation>,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for QueueEntry {}
impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueueEntry {
    // reversed so the BinaryHeap pops the smallest (frame, prio, seq)
    fn cmp(&self, other: &Self) -> Ordering {
        (other.frame, other.prio, other.seq).cmp(&(self.frame, self.prio, self.seq))
    }
}

/// The obligation queue: a total order on `(frame, prio)` consumed
/// smallest-first, FIFO among equals.
pub struct ObligQueue {
    heap: BinaryHeap<QueueEntry>,
    next_seq: u64,
}

impl ObligQueue {
    pub fn new() -> ObligQueue {
        ObligQueue { heap: BinaryHeap::new(), next_seq: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn push(&mut self, obl: Rc<Obligation>) {
        self.heap.push(QueueEntry {
            frame: obl.frame,
            prio: obl.prio,
            seq: self.next_seq,
            obl,
        });
        self.next_seq += 1;
    }

    pub fn head(&self) -> Option<&Rc<Obligation>> {
        self.heap.peek().map(|entry| &entry.obl)
    }

    pub fn pop(&mut self) -> Option<Rc<Obligation>> {
        self.heap.pop().map(|entry| entry.obl)
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

impl Default for ObligQueue {
    fn default() -> Self {
        ObligQueue::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lit::Lit;

    fn obl(frame: usize, prio: i64) -> Rc<Obligation> {
        Obligation::new(frame, prio, Cube::new(&[Lit::new(0, true)], &[]), None)
    }

    #[test]
    fn pops_by_frame_then_priority() {
        let mut queue = ObligQueue::new();
        queue.push(obl(2, 5));
        queue.push(obl(1, 9));
        queue.push(obl(2, 1));
        queue.push(obl(1, 3));
        let order: Vec<(usize, i64)> = std::iter::from_fn(|| {
            queue.pop().map(|o| (o.frame, o.prio))
        })
        .collect();
        assert_eq!(order, vec![(1, 3), (1, 9), (2, 1), (2, 5)]);
    }

    #[test]
    fn equal_keys_pop_fifo() {
        let mut queue = ObligQueue::new();
        let first = obl(1, 0);
        let second = obl(1, 0);
        queue.push(first.clone());
        queue.push(second.clone());
        assert!(Rc::ptr_eq(&queue.pop().unwrap(), &first));
        assert!(Rc::ptr_eq(&queue.pop().unwrap(), &second));
    }

    #[test]
    fn chain_lengths() {
        let tail = obl(3, 0);
        let mid = Obligation::new(2, 0, Cube::new(&[Lit::new(1, true)], &[]), Some(tail));
        let head = Obligation::new(1, 0, Cube::new(&[Lit::new(2, true)], &[]), Some(mid));
        assert_eq!(head.chain_len(), 3);
    }
}
