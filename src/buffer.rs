//! Fixed-capacity, newest-first event buffer.
//!
//! Used for both the transaction feed and the alert feed. Inserting past
//! capacity evicts the oldest entry; the evicted value is handed back so the
//! caller can keep any secondary index in sync.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct BoundedBuffer<T> {
    capacity: usize,
    entries: VecDeque<T>,
}

impl<T> BoundedBuffer<T> {
    /// Capacity must be positive.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "buffer capacity must be positive");
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Insert at the newest end, returning the evicted oldest entry if the
    /// buffer was full.
    pub fn insert(&mut self, entry: T) -> Option<T> {
        self.entries.push_front(entry);
        if self.entries.len() > self.capacity {
            self.entries.pop_back()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Newest-first iteration.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
