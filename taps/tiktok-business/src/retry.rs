//! Bounded exponential backoff for resource fetches.
//!
//! Token refreshes never go through this policy: an auth failure aborts the
//! sequence immediately.

use http::StatusCode;
use rand::Rng;
use std::time::Duration;

/// How a failed attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection errors, timeouts, 5xx and 429. Worth another attempt.
    Transient,
    /// Any other non-2xx. Retrying will not help.
    Permanent,
}

impl FailureKind {
    pub fn from_status(status: StatusCode) -> Self {
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            FailureKind::Transient
        } else {
            FailureKind::Permanent
        }
    }

    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_builder() {
            FailureKind::Permanent
        } else {
            FailureKind::Transient
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            multiplier,
        }
    }

    /// A policy that gives up after the first failure.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO, 1.0)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay before the next attempt, or `None` if the caller should give up.
    ///
    /// `attempt` is the 1-indexed attempt that just failed.
    pub fn next_delay(&self, kind: FailureKind, attempt: u32) -> Option<Duration> {
        if kind == FailureKind::Permanent || attempt >= self.max_attempts {
            return None;
        }
        let jitter_cap = self.base_delay.as_millis() as u64 / 2;
        let jitter = if jitter_cap == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_cap))
        };
        Some(self.backoff(attempt) + jitter)
    }

    /// Delay without jitter: `base * multiplier^(attempt - 1)`, capped at `max_delay`.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let millis =
            (self.base_delay.as_millis() as f64 * exp).min(self.max_delay.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }
}
