//! Consecutive refresh failure tracking.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Tracks consecutive re-authentication failures.
///
/// Used to escalate notifications after repeated failures.
#[derive(Default)]
pub struct RefreshFailureTracker {
    record: Mutex<Option<FailureRecord>>,
}

#[derive(Clone)]
struct FailureRecord {
    count: u32,
    first_failure: DateTime<Utc>,
    last_failure: DateTime<Utc>,
    last_error: String,
}

/// Snapshot of the current failure streak.
#[derive(Debug, Clone)]
pub struct FailureInfo {
    /// Number of consecutive failures.
    pub count: u32,
    /// Time of first failure in this sequence.
    pub first_failure: DateTime<Utc>,
    /// Time of most recent failure.
    pub last_failure: DateTime<Utc>,
    /// Error message from last failure.
    pub last_error: String,
}

impl RefreshFailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure and return the updated count.
    pub fn record_failure(&self, error: &str) -> u32 {
        let now = Utc::now();
        let mut record = self.record.lock();
        let entry = record.get_or_insert_with(|| FailureRecord {
            count: 0,
            first_failure: now,
            last_failure: now,
            last_error: String::new(),
        });

        entry.count += 1;
        entry.last_failure = now;
        entry.last_error = error.to_string();
        entry.count
    }

    /// Clear failures on success.
    pub fn clear(&self) {
        *self.record.lock() = None;
    }

    pub fn failure_count(&self) -> u32 {
        self.record.lock().as_ref().map(|r| r.count).unwrap_or(0)
    }

    pub fn failure_info(&self) -> Option<FailureInfo> {
        self.record.lock().as_ref().map(|r| FailureInfo {
            count: r.count,
            first_failure: r.first_failure,
            last_failure: r.last_failure,
            last_error: r.last_error.clone(),
        })
    }
}

/// Anti-spam gate for failure notices: the first failure, then every third one.
pub fn should_notify_failure(failure_count: u32) -> bool {
    failure_count == 1 || failure_count % 3 == 0
}
