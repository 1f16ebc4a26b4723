//! Store-owned clock.
//!
//! Bump ordering compares timestamps, so two writes must never share one and a
//! later write must never sort earlier. Every reading is strictly greater than
//! the previous one, at microsecond resolution (the precision stores persist).

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug)]
pub struct MonotonicClock {
    last_micros: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            last_micros: AtomicI64::new(i64::MIN),
        }
    }

    /// Current time, truncated to microseconds and strictly after every
    /// earlier reading or observed timestamp.
    pub fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now().timestamp_micros();
        let prev = match self.last_micros.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(wall.max(last.saturating_add(1)))
        }) {
            Ok(prev) | Err(prev) => prev,
        };
        from_micros(wall.max(prev.saturating_add(1)))
    }

    /// Never hand out a timestamp at or before `seen`. Used when a store
    /// reopens persisted data written by an earlier process.
    pub fn observe(&self, seen: DateTime<Utc>) {
        self.last_micros
            .fetch_max(seen.timestamp_micros(), Ordering::SeqCst);
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

pub fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + TimeDelta::microseconds(micros)
}
