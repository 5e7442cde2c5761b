// Rate-limit backoff
//
// A 429 suspends the poll that received it until the server's reset time
// (never less than the floor), or for a fixed fallback when the reply
// carries no usable reset time. The two pollers keep separate state.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::config::{DEFAULT_RATE_LIMIT_FALLBACK, DEFAULT_RATE_LIMIT_FLOOR};

/// How long to back off after a rate-limited reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub floor: Duration,
    pub fallback: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            floor: DEFAULT_RATE_LIMIT_FLOOR,
            fallback: DEFAULT_RATE_LIMIT_FALLBACK,
        }
    }
}

impl RateLimitPolicy {
    /// Delay before the next attempt, measured from `now`.
    pub fn delay(&self, reset_by: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
        match reset_by {
            Some(reset) => {
                let until_reset = (reset - now).to_std().unwrap_or(Duration::ZERO);
                until_reset.max(self.floor)
            }
            None => self.fallback,
        }
    }
}

/// State of one rate-limited poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitState {
    /// Calls the server said were left when it refused us.
    pub remaining: u32,
    pub reset_by: Option<DateTime<Utc>>,
    pub resume_not_before: Instant,
}

/// Backoff gate for one poller.
#[derive(Debug, Clone, Copy, Default)]
pub struct Backoff {
    state: Option<RateLimitState>,
}

impl Backoff {
    /// Suspend until `now + delay`.
    pub fn engage(
        &mut self,
        now: Instant,
        delay: Duration,
        remaining: u32,
        reset_by: Option<DateTime<Utc>>,
    ) {
        self.state = Some(RateLimitState {
            remaining,
            reset_by,
            resume_not_before: now + delay,
        });
    }

    pub fn clear(&mut self) {
        self.state = None;
    }

    pub fn state(&self) -> Option<&RateLimitState> {
        self.state.as_ref()
    }

    /// Time left before the poller may run again, `None` when not suspended.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.state
            .as_ref()
            .map(|s| s.resume_not_before.saturating_duration_since(now))
            .filter(|d| !d.is_zero())
    }

    pub fn is_active(&self, now: Instant) -> bool {
        self.remaining(now).is_some()
    }
}
