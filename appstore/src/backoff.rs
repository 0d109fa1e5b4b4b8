//! Rate-limit backoff for the review pagination loop.
//!
//! One `Backoff` value covers one pagination run. Each rate-limit signal moves it from
//! `Fetching` to `RateLimited { attempt }` and yields the delay to wait before retrying
//! the same page; a successful page resets it. Once `max_retries` retries have been spent
//! on one incident the state becomes `Exhausted` and no further delay is handed out.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            max_retries: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffState {
    Fetching,
    RateLimited { attempt: u32 },
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    delay: Duration,
    retries: u32,
    state: BackoffState,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Backoff {
            policy,
            delay: policy.initial_backoff.min(policy.max_backoff),
            retries: 0,
            state: BackoffState::Fetching,
        }
    }

    /// Records a rate-limit signal and returns how long to wait before retrying, or
    /// `None` once the retry budget for this incident is spent.
    pub fn on_rate_limited(&mut self) -> Option<Duration> {
        if self.retries >= self.policy.max_retries {
            self.state = BackoffState::Exhausted;
            return None;
        }

        let delay = self.delay;
        self.delay = self.delay.saturating_mul(2).min(self.policy.max_backoff);
        self.retries += 1;
        self.state = BackoffState::RateLimited {
            attempt: self.retries,
        };
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.delay = self.policy.initial_backoff.min(self.policy.max_backoff);
        self.retries = 0;
        self.state = BackoffState::Fetching;
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn state(&self) -> BackoffState {
        self.state
    }
}
