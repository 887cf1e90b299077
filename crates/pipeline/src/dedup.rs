//! Bounded memory of recently run `(review, patchset)` pairs.

use std::collections::{HashSet, VecDeque};

use crate::{PatchsetVersion, ReviewNumber};

type TriggerKey = (ReviewNumber, PatchsetVersion);

/// Remembers the last `capacity` trigger keys. A capacity of zero remembers
/// nothing, so every trigger is treated as new.
#[derive(Debug, Default)]
pub struct RecentTriggers {
    capacity: usize,
    order: VecDeque<TriggerKey>,
    seen: HashSet<TriggerKey>,
}

impl RecentTriggers {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// Records `key` and returns `true` if it was not already remembered.
    pub fn insert(&mut self, key: TriggerKey) -> bool {
        if self.capacity == 0 {
            return true;
        }
        if !self.seen.insert(key) {
            return false;
        }
        self.order.push_back(key);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}
