//! Capped exponential backoff for per-chain poll failures

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: u32,
    resume_at: Option<Instant>,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            failures: 0,
            resume_at: None,
        }
    }

    /// Whether a tick may run at `now`
    pub fn ready(&self, now: Instant) -> bool {
        self.resume_at.map_or(true, |at| now >= at)
    }

    /// Register a failed tick, returning how long the chain is paused
    pub fn record_failure(&mut self, now: Instant) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let delay = self.delay_for(self.failures);
        self.resume_at = Some(now + delay);
        delay
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
        self.resume_at = None;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// base * 2^(failures - 1), capped at max
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exponent = (failures - 1).min(31);
        self.base.saturating_mul(1u32 << exponent).min(self.max)
    }
}
