//! Rolling window of recent preview execution durations
//!
//! Drives adaptive UI feedback timing: callers use the average of recent
//! interactive-preview durations to decide, for example, how eagerly to
//! re-render while a slider is dragged.

use std::collections::VecDeque;

/// Default window capacity
pub const DEFAULT_WINDOW_CAPACITY: usize = 4;

/// Fixed-capacity rolling buffer of preview durations in milliseconds.
///
/// Eviction is pre-emptive: once the buffer reaches its capacity K, the
/// oldest entry is dropped, so after eviction the window holds K−1 entries.
/// Callers must not assume exactly K entries are retained.
#[derive(Debug, Clone)]
pub struct PreviewDurations {
    entries: VecDeque<u64>,
    capacity: usize,
}

impl PreviewDurations {
    /// Create a window with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_WINDOW_CAPACITY)
    }

    /// Create a window with a custom capacity (at least 1)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record a preview duration, evicting the oldest entries at the
    /// capacity threshold
    pub fn record(&mut self, duration_ms: u64) {
        self.entries.push_back(duration_ms);
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
    }

    /// Most recently recorded duration, or 0 if empty
    pub fn last(&self) -> u64 {
        self.entries.back().copied().unwrap_or(0)
    }

    /// Arithmetic mean over the current contents, or 0 if empty
    pub fn average(&self) -> u64 {
        if self.entries.is_empty() {
            return 0;
        }
        let sum: u64 = self.entries.iter().sum();
        sum / self.entries.len() as u64
    }

    /// Number of retained entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no durations are retained
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear all entries
    pub fn reset(&mut self) {
        self.entries.clear();
    }
}

impl Default for PreviewDurations {
    fn default() -> Self {
        Self::new()
    }
}
