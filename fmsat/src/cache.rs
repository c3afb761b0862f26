//! Bounded cache of satisfying assignments.
use std::mem::replace;

use fmsat_formula::Lit;

use crate::assignment::Assignment;
use crate::implication::LiteralPair;

/// Upper bound for the number of cached models per analysis.
pub const MAX_SOLUTION_BUFFER: usize = 1000;

/// A fixed capacity buffer that overwrites its oldest entry when full.
#[derive(Clone, Debug)]
pub struct RingBuffer<T> {
    items: Vec<T>,
    capacity: usize,
    /// Position of the oldest item once the buffer is full.
    oldest: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> RingBuffer<T> {
        RingBuffer {
            items: Vec::with_capacity(capacity),
            capacity,
            oldest: 0,
        }
    }

    /// Adds an item and returns the evicted one.
    ///
    /// A buffer of capacity zero hands back every item.
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }
        if self.items.len() < self.capacity {
            self.items.push(item);
            return None;
        }
        let evicted = replace(&mut self.items[self.oldest], item);
        self.oldest = (self.oldest + 1) % self.capacity;
        Some(evicted)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let (newer, older) = self.items.split_at(self.oldest);
        older.iter().chain(newer.iter())
    }
}

/// Recently found models, used to refute candidate implications without solver queries.
///
/// Every cached assignment satisfies the base formula, so a pair `a => b` is refuted by any
/// cached assignment containing `a` and `¬b`.
#[derive(Clone, Debug)]
pub struct ModelCache {
    models: RingBuffer<Assignment>,
}

impl ModelCache {
    pub fn new(capacity: usize) -> ModelCache {
        ModelCache {
            models: RingBuffer::new(capacity),
        }
    }

    /// A cache sized for an analysis of `requests` queries.
    pub fn for_requests(requests: usize, max_capacity: usize) -> ModelCache {
        ModelCache::new(requests.min(max_capacity))
    }

    pub fn add(&mut self, model: Assignment) {
        self.models.push(model);
    }

    /// Whether some cached model makes `lit` true.
    pub fn contains_literal(&self, lit: Lit) -> bool {
        self.models.iter().any(|model| model.contains(lit))
    }

    /// Whether some cached model is a counterexample to the implication.
    pub fn refutes(&self, pair: LiteralPair) -> bool {
        self.models
            .iter()
            .any(|model| model.contains(pair.forcing) && model.contains(!pair.forced))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.models.capacity()
    }

    /// Cached models from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Assignment> {
        self.models.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use fmsat_formula::lit;

    #[test]
    fn evicts_oldest_first() {
        let mut buffer = RingBuffer::new(3);
        for item in 1..=3 {
            assert_eq!(buffer.push(item), None);
        }
        assert_eq!(buffer.push(4), Some(1));
        assert_eq!(buffer.push(5), Some(2));
        assert_eq!(buffer.iter().cloned().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut cache = ModelCache::for_requests(0, MAX_SOLUTION_BUFFER);
        cache.add(Assignment::from_dimacs(&[1, -2]));

        assert!(cache.is_empty());
        assert!(!cache.contains_literal(lit!(1)));
        assert!(!cache.refutes(LiteralPair::new(lit!(1), lit!(2))));
    }

    #[test]
    fn refutes_with_counterexample() {
        let mut cache = ModelCache::new(2);
        cache.add(Assignment::from_dimacs(&[1, -2, 3]));

        assert!(cache.refutes(LiteralPair::new(lit!(1), lit!(2))));
        assert!(cache.refutes(LiteralPair::new(lit!(3), lit!(-3))));
        assert!(!cache.refutes(LiteralPair::new(lit!(1), lit!(3))));
        assert!(!cache.refutes(LiteralPair::new(lit!(2), lit!(1))));
        assert!(cache.contains_literal(lit!(-2)));

        cache.add(Assignment::from_dimacs(&[-1, 2, 3]));
        cache.add(Assignment::from_dimacs(&[-1, -2, -3]));
        assert_eq!(cache.len(), 2);
        assert!(!cache.refutes(LiteralPair::new(lit!(1), lit!(2))));
    }

    proptest! {
        #[test]
        fn keeps_most_recent(capacity in 0..8usize, items in prop::collection::vec(any::<u8>(), 0..32)) {
            let mut buffer = RingBuffer::new(capacity);
            for &item in items.iter() {
                buffer.push(item);
            }
            let kept: Vec<u8> = buffer.iter().cloned().collect();
            let expected = &items[items.len().saturating_sub(capacity)..];
            prop_assert_eq!(&kept[..], expected);
        }
    }
}
