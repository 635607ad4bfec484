//! Bounded block-timestamp cache.

use std::collections::{HashMap, VecDeque};

/// Block number → timestamp, evicting the oldest insertion past `capacity`.
#[derive(Debug)]
pub struct TimestampCache {
    capacity: usize,
    entries: HashMap<u64, i64>,
    order: VecDeque<u64>,
}

impl TimestampCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn get(&self, block: u64) -> Option<i64> {
        self.entries.get(&block).copied()
    }

    pub fn insert(&mut self, block: u64, timestamp: i64) {
        if self.entries.insert(block, timestamp).is_some() {
            return;
        }
        self.order.push_back(block);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
