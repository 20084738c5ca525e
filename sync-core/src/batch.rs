//! Debounce batcher for incoming push events.
//!
//! Bursts of events (a group chat waking up, a reconnect replay) are
//! collected into one unit so the engine merges and redraws once:
//! - The first item of a batch arms a deadline `window` in the future
//! - Further items join the batch without moving the deadline
//! - The batch is released when the deadline passes or it reaches `max_batch`
//!
//! The batcher owns no timer. The connection manager sleeps until
//! [`EventBatcher::deadline`] and then calls [`EventBatcher::flush_due`].

use std::time::{Duration, Instant};

/// Default debounce window.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(50);

/// Default maximum batch size before a forced flush.
pub const DEFAULT_MAX_BATCH: usize = 100;

/// Buffer + deadline batching of items.
#[derive(Debug)]
pub struct EventBatcher<T> {
    window: Duration,
    max_batch: usize,
    pending: Vec<T>,
    deadline: Option<Instant>,
}

impl<T> EventBatcher<T> {
    /// Create a batcher with the given window and size cap (minimum 1).
    pub fn new(window: Duration, max_batch: usize) -> Self {
        Self {
            window,
            max_batch: max_batch.max(1),
            pending: Vec::new(),
            deadline: None,
        }
    }

    /// Add an item received at `now`.
    ///
    /// Returns the full batch if this item filled it.
    pub fn push(&mut self, item: T, now: Instant) -> Option<Vec<T>> {
        if self.pending.is_empty() {
            self.deadline = Some(now + self.window);
        }
        self.pending.push(item);
        if self.pending.len() >= self.max_batch {
            return Some(self.flush());
        }
        None
    }

    /// When the current batch must be released, if one is open.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Release the batch if its deadline has passed.
    pub fn flush_due(&mut self, now: Instant) -> Option<Vec<T>> {
        match self.deadline {
            Some(deadline) if now >= deadline => Some(self.flush()),
            _ => None,
        }
    }

    /// Release whatever is pending, possibly nothing.
    pub fn flush(&mut self) -> Vec<T> {
        self.deadline = None;
        std::mem::take(&mut self.pending)
    }

    /// Number of pending items.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<T> Default for EventBatcher<T> {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_MAX_BATCH)
    }
}
