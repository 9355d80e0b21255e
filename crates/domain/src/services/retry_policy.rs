//! Retry policy for webhook deliveries.
//!
//! A failed attempt either schedules the next attempt from a fixed backoff
//! table or ends the delivery. The delivery ends when the attempt budget is
//! spent or when the delivery is older than the overall deadline.

use chrono::{DateTime, Duration, Utc};

/// Delay before the next attempt, indexed by the number of attempts made so far.
/// Attempt 1: 10s, 2: 1m, 3: 5m, 4: 15m, 5: 30m
pub const BACKOFF_SCHEDULE_SECS: [i64; 5] = [10, 60, 300, 900, 1800];

/// Default number of HTTP attempts per delivery.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;

/// Default age after which a delivery is no longer retried (2 hours).
pub const DEFAULT_RETRY_DEADLINE_SECS: i64 = 7200;

/// Why a delivery was marked permanently failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    AttemptsExhausted,
    DeadlineExceeded,
}

impl GiveUpReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            GiveUpReason::AttemptsExhausted => "attempts_exhausted",
            GiveUpReason::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

impl std::fmt::Display for GiveUpReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with a delivery after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    Retry {
        attempt_count: i32,
        next_retry_at: DateTime<Utc>,
    },
    GiveUp {
        attempt_count: i32,
        reason: GiveUpReason,
    },
}

/// Attempt budget and deadline applied to every delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            deadline: Duration::seconds(DEFAULT_RETRY_DEADLINE_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: i32, deadline: Duration) -> Self {
        Self {
            max_attempts,
            deadline,
        }
    }

    /// Backoff after the given attempt (1-based). Attempts past the end of the
    /// table reuse the last delay.
    pub fn backoff_for(attempt: i32) -> Duration {
        let index = (attempt.max(1) as usize - 1).min(BACKOFF_SCHEDULE_SECS.len() - 1);
        Duration::seconds(BACKOFF_SCHEDULE_SECS[index])
    }

    /// True once the delivery is older than the retry deadline.
    pub fn deadline_exceeded(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - created_at > self.deadline
    }

    /// True when no further attempt may be made.
    pub fn budget_exhausted(&self, attempt_count: i32) -> bool {
        attempt_count >= self.max_attempts
    }

    /// Decides the next state after a failed attempt.
    ///
    /// `previous_attempts` is the stored count before this attempt; the
    /// returned `attempt_count` includes the attempt that just failed.
    pub fn on_failure(
        &self,
        previous_attempts: i32,
        created_at: DateTime<Utc>,
        attempted_at: DateTime<Utc>,
    ) -> FailureDecision {
        let attempt_count = (previous_attempts + 1).min(self.max_attempts);

        if self.budget_exhausted(attempt_count) {
            return FailureDecision::GiveUp {
                attempt_count,
                reason: GiveUpReason::AttemptsExhausted,
            };
        }

        if self.deadline_exceeded(created_at, attempted_at) {
            return FailureDecision::GiveUp {
                attempt_count,
                reason: GiveUpReason::DeadlineExceeded,
            };
        }

        FailureDecision::Retry {
            attempt_count,
            next_retry_at: attempted_at + Self::backoff_for(attempt_count),
        }
    }

    /// Creation time before which pending deliveries are past the deadline.
    pub fn deadline_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.deadline
    }
}
