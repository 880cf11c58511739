//! Bounded history buffer shared between threads
//!
//! A fixed-capacity FIFO behind a mutex. When full, pushing evicts the oldest
//! item. Readers always copy out, so callers never hold the lock while
//! computing.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

pub struct BoundedBuffer<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
}

impl<T: Clone> BoundedBuffer<T> {
    /// A capacity of zero is treated as one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, item: T) {
        let mut items = self.lock();
        if items.len() == self.capacity {
            items.pop_front();
        }
        items.push_back(item);
    }

    /// Copy of the newest `n` items, oldest first
    pub fn snapshot_tail(&self, n: usize) -> Vec<T> {
        let items = self.lock();
        let skip = items.len().saturating_sub(n);
        items.iter().skip(skip).cloned().collect()
    }

    pub fn latest(&self) -> Option<T> {
        self.lock().back().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Occupancy in `0.0..=1.0`
    pub fn fill_ratio(&self) -> f64 {
        self.len() as f64 / self.capacity as f64
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    // A panic elsewhere cannot leave the deque half-updated, so poison is ignored
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
