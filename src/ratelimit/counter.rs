//! Sliding-window submission log.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

/// Chronologically ordered timestamps of accepted submissions.
///
/// Records are appended in insertion order, which is also time order, so
/// the oldest record in the window is always at the front.
#[derive(Debug, Clone, Default)]
pub struct SubmissionLog {
    records: VecDeque<DateTime<Utc>>,
}

impl SubmissionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records younger than `window` at `now`.
    pub fn count_within(&self, now: DateTime<Utc>, window: Duration) -> usize {
        self.records
            .iter()
            .filter(|&&at| in_window(at, now, window))
            .count()
    }

    /// Oldest record still inside the window.
    pub fn oldest_within(&self, now: DateTime<Utc>, window: Duration) -> Option<DateTime<Utc>> {
        self.records
            .iter()
            .copied()
            .find(|&at| in_window(at, now, window))
    }

    /// Most recent record, regardless of window.
    pub fn newest(&self) -> Option<DateTime<Utc>> {
        self.records.back().copied()
    }

    /// Drop records that have fallen out of the window.
    pub fn prune(&mut self, now: DateTime<Utc>, window: Duration) {
        while let Some(&front) = self.records.front() {
            if in_window(front, now, window) {
                break;
            }
            self.records.pop_front();
        }
    }

    /// Append a record.
    ///
    /// Timestamps earlier than the newest record are clamped to it so the
    /// log stays ordered even if the clock steps backwards.
    pub fn record(&mut self, at: DateTime<Utc>) {
        let at = match self.newest() {
            Some(newest) if at < newest => newest,
            _ => at,
        };
        self.records.push_back(at);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn in_window(at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    now - at < window
}
