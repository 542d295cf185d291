use std::fmt::Debug;
use std::time::Duration;

/// Delay before the next reconnect or re-poll after consecutive failures
pub trait BackoffPolicy: Send + Sync + Debug {
    /// # Arguments
    /// * `failures` - Consecutive failures so far, starting at 1
    fn delay(&self, failures: u32) -> Duration;
}

/// Same delay after every failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff {
    pub delay: Duration,
}

impl FixedBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl BackoffPolicy for FixedBackoff {
    fn delay(&self, _failures: u32) -> Duration {
        self.delay
    }
}

/// Doubling delay capped at `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.initial
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }
}
