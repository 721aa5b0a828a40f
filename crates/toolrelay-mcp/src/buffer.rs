//! Bounded FIFO of captured text lines.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Default number of lines retained per provider.
pub const DEFAULT_LINE_CAPACITY: usize = 256;

/// A task-safe bounded queue of lines. When full, the oldest line is dropped
/// so a chatty producer never blocks on a slow consumer.
#[derive(Debug)]
pub struct LineBuffer {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl LineBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_LINE_CAPACITY))),
            capacity: capacity.max(1),
        }
    }

    /// Append a line, evicting the oldest one if the buffer is full.
    /// Returns `true` if a line was evicted.
    pub fn push(&self, line: impl Into<String>) -> bool {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        let evicted = if lines.len() >= self.capacity {
            lines.pop_front();
            true
        } else {
            false
        };
        lines.push_back(line.into());
        evicted
    }

    /// Remove and return every buffered line, oldest first.
    pub fn drain(&self) -> Vec<String> {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_CAPACITY)
    }
}
