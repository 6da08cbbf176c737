//! Bounded record of recently observed inbound messages.
//!
//! The buffer is append-only: the only way an entry leaves is by being the
//! oldest one when capacity is exceeded.

use std::collections::VecDeque;

use crate::types::HistoryEntry;

/// Number of entries kept before the oldest is evicted.
pub const HISTORY_CAPACITY: usize = 100;

/// Fixed-capacity FIFO of [`HistoryEntry`] values.
#[derive(Debug, Clone)]
pub struct MessageHistoryBuffer {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl MessageHistoryBuffer {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    /// A buffer holding at most `capacity` entries (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push to the back, evicting from the front once over capacity.
    pub fn append(&mut self, entry: HistoryEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// The last `min(limit, len)` entries, oldest of the window first.
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
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
}

impl Default for MessageHistoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}
