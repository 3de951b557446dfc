//! Bounded diagnostic history of exchanged messages.
//!
//! Every send/receive on a [`FramedChannel`](crate::network::FramedChannel)
//! can be mirrored here. The queue never blocks the protocol: once full,
//! the oldest entry is evicted and the drop counter goes up.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Default number of retained entries.
pub const DEFAULT_HISTORY_CAPACITY: usize = 256;

/// Which way a message travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Sent => write!(f, "sent"),
            Direction::Received => write!(f, "received"),
        }
    }
}

/// One recorded message.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub direction: Direction,
    pub message: String,
    pub at: SystemTime,
}

/// Fixed-capacity FIFO of [`HistoryEntry`] with an observable drop count.
#[derive(Debug)]
pub struct MessageHistory {
    capacity: usize,
    entries: Mutex<VecDeque<HistoryEntry>>,
    dropped: AtomicU64,
}

impl MessageHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record a message, evicting the oldest entry when full.
    pub fn record(&self, direction: Direction, message: &str) {
        let entry = HistoryEntry {
            direction,
            message: message.trim_end_matches('\n').to_string(),
            at: SystemTime::now(),
        };

        // A poisoned lock only means another recorder panicked mid-push;
        // the queue itself is still consistent.
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if self.capacity == 0 {
            self.note_drop();
            return;
        }
        if entries.len() >= self.capacity {
            entries.pop_front();
            self.note_drop();
        }
        entries.push_back(entry);
    }

    fn note_drop(&self) {
        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!(capacity = self.capacity, dropped = total, "message history full, dropping oldest entry");
    }

    /// Number of entries evicted (or refused) so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the retained entries, oldest first.
    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        match self.entries.lock() {
            Ok(guard) => guard.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }
}

impl Default for MessageHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
