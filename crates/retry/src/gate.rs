//! RetryGate - budgeted, cancellable waiting between attempts

use std::time::Duration;

use contracts::{BackoffKind, IngestError, RetryConfig};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{Backoff, ExponentialBackoff, FixedDelay};

/// Retry state for one operation.
///
/// Owned by the retry loop and dropped on success or exhaustion.
#[derive(Debug)]
pub struct RetryGate<B> {
    backoff: B,
    elapsed: Duration,
    budget: Duration,
    token: CancellationToken,
}

impl<B: Backoff> RetryGate<B> {
    pub fn new(backoff: B, budget: Duration, token: CancellationToken) -> Self {
        Self {
            backoff,
            elapsed: Duration::ZERO,
            budget,
            token,
        }
    }

    /// Whether more time may still be spent retrying
    pub fn allow(&self) -> bool {
        self.elapsed < self.budget && !self.token.is_cancelled()
    }

    /// Sleep the next delay and record it.
    ///
    /// # Errors
    /// `IngestError::Cancelled` as soon as the token fires. The token keeps
    /// its cancelled state, so other holders still observe it.
    pub async fn pause(&mut self) -> Result<Duration, IngestError> {
        let delay = self.backoff.next_delay();
        debug!(
            attempt = self.backoff.attempts(),
            delay_ms = delay.as_millis() as u64,
            "Backing off"
        );

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(IngestError::Cancelled),
            _ = tokio::time::sleep(delay) => {
                self.elapsed = self.elapsed.saturating_add(delay);
                Ok(delay)
            }
        }
    }

    /// Total time spent paused
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Pauses performed so far
    pub fn attempts(&self) -> u32 {
        self.backoff.attempts()
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }
}

/// Retry policy parameters, shared by every gate a pipeline creates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    pub kind: BackoffKind,
    /// Fixed delay, or the unit of the exponential schedule
    pub base: Duration,
    pub budget: Duration,
}

impl RetrySettings {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            kind: config.kind,
            base: Duration::from_millis(config.base_ms),
            budget: Duration::from_millis(config.budget_ms),
        }
    }

    /// Fresh backoff schedule
    pub fn backoff(&self) -> Box<dyn Backoff> {
        match self.kind {
            BackoffKind::Fixed => Box::new(FixedDelay::new(self.base)),
            BackoffKind::Exponential => Box::new(ExponentialBackoff::new(2, self.base)),
        }
    }

    /// Fresh gate bound to the pipeline cancellation token
    pub fn gate(&self, token: CancellationToken) -> RetryGate<Box<dyn Backoff>> {
        RetryGate::new(self.backoff(), self.budget, token)
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
