// History window - bounded per-channel sample buffer
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

use super::reading::Reading;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub raw: Option<f64>,
}

impl From<Reading> for HistoryEntry {
    fn from(reading: Reading) -> Self {
        Self {
            timestamp: reading.timestamp,
            raw: reading.value,
        }
    }
}

/// FIFO ring buffer, oldest entry first.
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl HistoryWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &VecDeque<HistoryEntry> {
        &self.entries
    }

    pub fn raw_values(&self) -> Vec<Option<f64>> {
        self.entries.iter().map(|e| e.raw).collect()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }
}
