// src/store/event_log.rs

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::lifecycle::ExecutionEvent;

/// Bounded, append-only execution log. Oldest entries fall off the front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLog {
    entries: VecDeque<ExecutionEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    pub fn push(&mut self, event: ExecutionEvent, capacity: usize) {
        self.entries.push_back(event);
        self.truncate(capacity);
    }

    pub fn truncate(&mut self, capacity: usize) {
        while self.entries.len() > capacity {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &ExecutionEvent> {
        self.entries.iter()
    }

    /// The most recent `limit` entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<ExecutionEvent> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
