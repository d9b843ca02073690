//! Bounded set of deleted message ids

use std::collections::{HashSet, VecDeque};

use chat_core::MessageId;

/// Remembers deleted ids so late creates and updates can be absorbed.
///
/// Oldest entries are evicted first once `capacity` is reached.
#[derive(Debug, Clone)]
pub struct Tombstones {
    order: VecDeque<MessageId>,
    ids: HashSet<MessageId>,
    capacity: usize,
}

impl Tombstones {
    /// Create an empty set holding at most `capacity` ids
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            ids: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record a deleted id; returns `false` if it was already recorded
    pub fn insert(&mut self, id: MessageId) -> bool {
        if self.ids.contains(&id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.ids.remove(&evicted);
            }
        }
        self.ids.insert(id.clone());
        self.order.push_back(id);
        true
    }

    /// Forget an id (a rejected delete was rolled back)
    pub fn lift(&mut self, id: &MessageId) -> bool {
        if self.ids.remove(id) {
            self.order.retain(|t| t != id);
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
