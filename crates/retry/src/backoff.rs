//! Delay schedules

use std::time::Duration;

/// Delay schedule, one call per attempt
pub trait Backoff: Send {
    /// Delay before the next attempt; advances the attempt counter
    fn next_delay(&mut self) -> Duration;

    /// Attempts computed so far
    fn attempts(&self) -> u32;
}

impl Backoff for Box<dyn Backoff> {
    fn next_delay(&mut self) -> Duration {
        (**self).next_delay()
    }

    fn attempts(&self) -> u32 {
        (**self).attempts()
    }
}

/// Same delay for every attempt
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    attempts: u32,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay, attempts: 0 }
    }
}

impl Backoff for FixedDelay {
    fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        self.delay
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// `delay(attempt) = unit * base * 2^attempt`, attempt starting at 1.
///
/// Uncapped; saturates at `u64::MAX` nanoseconds instead of overflowing.
/// Callers bound total waiting through the gate budget.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: u64,
    unit: Duration,
    attempts: u32,
}

impl ExponentialBackoff {
    pub fn new(base: u64, unit: Duration) -> Self {
        Self {
            base,
            unit,
            attempts: 0,
        }
    }

    /// Delay for a given attempt, without advancing
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64
            .checked_shl(attempt)
            .map_or(u64::MAX, |pow| self.base.saturating_mul(pow));
        let nanos = self.unit.as_nanos().saturating_mul(u128::from(factor));
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

impl Backoff for ExponentialBackoff {
    fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        self.delay(self.attempts)
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }
}
