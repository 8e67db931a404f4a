//! Bounded retry for navigation and reveal steps
//!
//! # Retry Logic
//!
//! | Condition                  | Action                                  |
//! |----------------------------|-----------------------------------------|
//! | Timeout / network error    | Retry up to `max-attempts`, with delay  |
//! | Render service 5xx / 429   | Retry up to `max-attempts`, with delay  |
//! | Any other driver error     | Immediate failure                       |

use crate::browser::{DriverError, DriverResult, PageDriver, PageSnapshot};
use crate::config::{Backoff, RetryConfig};
use std::time::Duration;

/// Ceiling for exponential delays
const MAX_DELAY: Duration = Duration::from_secs(60);

/// Explicit retry policy passed into navigation and scroll steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Base delay between attempts
    pub delay: Duration,

    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: Duration::from_millis(config.delay_ms),
            backoff: config.backoff,
        }
    }

    /// A policy that never retries and never waits
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
            backoff: Backoff::Fixed,
        }
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.delay.saturating_mul(factor).min(MAX_DELAY.max(self.delay))
            }
        }
    }

    /// Delay before the next attempt, or `None` if `err` must be surfaced now
    pub fn retry_delay(&self, attempt: u32, err: &DriverError) -> Option<Duration> {
        (err.is_transient() && attempt < self.max_attempts).then(|| self.delay_for(attempt))
    }

    /// Opens `url`, retrying transient failures
    pub async fn navigate(&self, driver: &mut dyn PageDriver, url: &str) -> DriverResult<PageSnapshot> {
        let mut attempt = 1;
        loop {
            match driver.navigate(url).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) => self.backoff_or_fail("navigate", url, attempt, e).await?,
            }
            attempt += 1;
        }
    }

    /// Extends the page reveal, retrying transient failures
    pub async fn reveal_more(&self, driver: &mut dyn PageDriver) -> DriverResult<PageSnapshot> {
        let mut attempt = 1;
        loop {
            let step = match driver.reveal_more().await {
                Ok(()) => driver.snapshot().await,
                Err(e) => Err(e),
            };
            match step {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) => self.backoff_or_fail("reveal", "", attempt, e).await?,
            }
            attempt += 1;
        }
    }

    async fn backoff_or_fail(&self, what: &str, target: &str, attempt: u32, err: DriverError) -> DriverResult<()> {
        let Some(delay) = self.retry_delay(attempt, &err) else {
            return Err(err);
        };
        tracing::debug!(
            "{} {} failed (attempt {}/{}): {}; retrying in {:?}",
            what,
            target,
            attempt,
            self.max_attempts,
            err,
            delay
        );
        tokio::time::sleep(delay).await;
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
