use std::time::Duration;

/// Effective backoff base for very small configured periods; without it a
/// sub-second cadence would never back off visibly.
pub const MINIMUM_BACKOFF_PERIOD: Duration = Duration::from_secs(5);

/// Hard ceiling on the interval between ship attempts.
pub const MAXIMUM_BACKOFF_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Failure-count-driven delay policy between ship attempts.
///
/// Touched only from the shipper task, so plain mutable state suffices.
#[derive(Debug)]
pub struct ConnectionSchedule {
    period: Duration,
    failures_since_success: u32,
}

impl ConnectionSchedule {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            failures_since_success: 0,
        }
    }

    pub fn mark_success(&mut self) {
        self.failures_since_success = 0;
    }

    pub fn mark_failure(&mut self) {
        self.failures_since_success = self.failures_since_success.saturating_add(1);
    }

    pub fn failures(&self) -> u32 {
        self.failures_since_success
    }

    /// Time to wait before the next attempt.
    ///
    /// The first failure retries at the configured cadence; penalties start
    /// with the second, doubling from `max(period, 5s)`, capped at ten
    /// minutes and never below the configured period.
    pub fn next_interval(&self) -> Duration {
        if self.failures_since_success <= 1 {
            return self.period;
        }
        let base = self.period.max(MINIMUM_BACKOFF_PERIOD);
        let factor = 2u32.saturating_pow((self.failures_since_success - 1).min(16));
        base.saturating_mul(factor)
            .min(MAXIMUM_BACKOFF_INTERVAL)
            .max(self.period)
    }
}
