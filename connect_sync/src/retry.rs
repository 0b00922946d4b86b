//! Bounded exponential backoff.
//!
//! A failed call is retried only when the error says it is transient. The delay
//! before retry attempt `a` (counting from 1) is `base_delay * factor^a`, so the
//! defaults wait 40s, 80s and 160s before giving up.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use crate::error::Retryable;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(20_000);
pub const DEFAULT_DELAY_FACTOR: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            factor: DEFAULT_DELAY_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// Policy used for database connections and statements.
    pub fn database() -> Self {
        Self {
            base_delay: Duration::from_millis(5_000),
            ..Self::default()
        }
    }

    /// Policy used for a single page request against Amazon Connect.
    pub fn remote_page() -> Self {
        Self {
            max_retries: 1,
            base_delay: Duration::from_millis(2_000),
            factor: DEFAULT_DELAY_FACTOR,
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(self.factor.saturating_pow(attempt))
    }

    /// Run `op` until it succeeds, fails with a terminal error, or the retries
    /// are used up. The last error is returned as is.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} failed with a retryable error, attempt {} of {} in {:?}: {}",
                        operation, attempt, self.max_retries, delay, err
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    error!("{} failed after {} retries: {}", operation, attempt, err);
                    return Err(err);
                }
            }
        }
    }
}
