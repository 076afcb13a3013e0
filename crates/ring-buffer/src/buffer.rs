//! Ring buffer implementation

use serde::{Serialize, Serializer};
use std::collections::VecDeque;

/// Default capacity (three most recent violations)
pub const DEFAULT_CAPACITY: usize = 3;

/// Bounded ring, newest item at index 0
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    /// Front is newest
    items: VecDeque<T>,
    capacity: usize,
    /// Items ever pushed, evicted ones included
    total_pushed: u64,
}

impl<T> RingBuffer<T> {
    /// Create a ring holding at most `capacity` items (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            total_pushed: 0,
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Insert as newest; returns the evicted oldest item when full
    pub fn push(&mut self, item: T) -> Option<T> {
        self.total_pushed += 1;
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_back()
        } else {
            None
        };
        self.items.push_front(item);
        evicted
    }

    /// Item by recency, 0 = newest
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn newest(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn oldest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Newest-first iterator
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Clone out the newest `count` items, newest first
    pub fn read_last(&self, count: usize) -> Vec<T> {
        self.items.iter().take(count).cloned().collect()
    }
}

impl<T> Default for RingBuffer<T> {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl<T: Serialize> Serialize for RingBuffer<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.items.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_push_and_read() {
        let mut ring = RingBuffer::new(10);
        for i in 0..5 {
            ring.push(i);
        }
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.read_last(3), vec![4, 3, 2]);
        assert_eq!(ring.newest(), Some(&4));
        assert_eq!(ring.oldest(), Some(&0));
    }

    #[test]
    fn test_overwrite_oldest() {
        let mut ring = RingBuffer::with_default_capacity();
        assert_eq!(ring.push("a"), None);
        assert_eq!(ring.push("b"), None);
        assert_eq!(ring.push("c"), None);
        assert!(ring.is_full());
        assert_eq!(ring.push("d"), Some("a"));

        let items: Vec<_> = ring.iter().copied().collect();
        assert_eq!(items, vec!["d", "c", "b"]);
        assert_eq!(ring.total_pushed(), 4);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut ring = RingBuffer::new(0);
        ring.push(1);
        ring.push(2);
        assert_eq!(ring.capacity(), 1);
        assert_eq!(ring.get(0), Some(&2));
    }

    #[test]
    fn test_serializes_newest_first() {
        let mut ring = RingBuffer::new(2);
        for i in 1..=3 {
            ring.push(i);
        }
        assert_eq!(serde_json::to_string(&ring).unwrap(), "[3,2]");
    }

    proptest! {
        #[test]
        fn test_bounded_and_ordered(capacity in 1usize..8, values in prop::collection::vec(any::<u32>(), 0..40)) {
            let mut ring = RingBuffer::new(capacity);
            for v in &values {
                ring.push(*v);
            }
            prop_assert!(ring.len() <= capacity);
            let expected: Vec<u32> = values.iter().rev().take(capacity).copied().collect();
            prop_assert_eq!(ring.read_last(capacity), expected);
        }
    }
}
