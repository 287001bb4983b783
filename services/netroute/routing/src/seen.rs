//! Set of already processed message ids.

use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// Processed message ids used for duplicate suppression.
///
/// Unbounded by default. With a capacity, the oldest ids are forgotten first.
#[derive(Debug, Clone, Default)]
pub struct SeenMessages {
    ids: HashSet<String>,
    /// Insertion order, only tracked when bounded
    order: VecDeque<String>,
    capacity: Option<usize>,
}

impl SeenMessages {
    /// Seen-set that never forgets
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Seen-set remembering at most `capacity` ids
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity: Some(capacity.max(1)),
        }
    }

    /// Build from an optional capacity
    pub fn from_capacity(capacity: Option<usize>) -> Self {
        match capacity {
            Some(capacity) => Self::with_capacity(capacity),
            None => Self::unbounded(),
        }
    }

    /// Record an id. Returns `true` if it had not been seen.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }

        self.ids.insert(id.to_string());

        if let Some(capacity) = self.capacity {
            self.order.push_back(id.to_string());
            while self.order.len() > capacity {
                if let Some(evicted) = self.order.pop_front() {
                    debug!("Seen-set full, forgetting message {}", evicted);
                    self.ids.remove(&evicted);
                }
            }
        }

        true
    }

    /// Whether the id has been recorded
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Number of remembered ids
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Configured capacity, `None` when unbounded
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}
