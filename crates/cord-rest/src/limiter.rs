//! Per-bucket call budget

use std::time::Duration;

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Outcome of [`BucketLimiter::try_acquire`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// The call may be sent now
    Ready,
    /// The bucket is exhausted, try again after this long
    Wait(Duration),
}

/// Remaining-call budget and reset time of one rate-limit bucket.
///
/// Until the first response carrying rate-limit headers is observed the
/// limiter knows no reset time and admits every call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketLimiter {
    limit: u32,
    remaining: u32,
    reset_at: Option<i64>,
}

impl BucketLimiter {
    /// Added to every wait so the retry lands after the server's own reset
    pub const SAFETY_MARGIN_MS: i64 = 1;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether a call may proceed at `now` (epoch milliseconds).
    ///
    /// A bucket whose reset time has passed is treated as freshly reset.
    pub fn try_acquire(&mut self, now: i64) -> Acquire {
        let Some(reset_at) = self.reset_at else {
            return Acquire::Ready;
        };

        if now >= reset_at {
            // A fresh window always admits at least one call
            self.remaining = self.limit.max(1);
            self.reset_at = Some(now);
        }

        if self.remaining > 0 {
            self.remaining -= 1;
            Acquire::Ready
        } else {
            let wait = reset_at - now + Self::SAFETY_MARGIN_MS;
            Acquire::Wait(Duration::from_millis(wait.max(0) as u64))
        }
    }

    /// Overwrite state from a response's rate-limit headers
    pub fn observe(&mut self, limit: u32, remaining: u32, reset_at: i64) {
        self.limit = limit;
        self.remaining = remaining;
        self.reset_at = Some(reset_at);
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Reset time in epoch milliseconds, if any response has been observed
    pub fn reset_at(&self) -> Option<i64> {
        self.reset_at
    }
}
