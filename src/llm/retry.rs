//! Retry with exponential backoff and jitter for transient provider statuses.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Statuses treated as transient by default.
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 8] = [408, 409, 425, 429, 500, 502, 503, 504];

/// Exponential backoff retry policy.
///
/// Delay for attempt `n` (0-based) is `base_delay_ms * 2^n`, capped at
/// `max_delay_ms`, then stretched by a random 0-50%.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first call
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Upper bound on the pre-jitter delay
    pub max_delay_ms: u64,
    /// HTTP statuses worth retrying
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Whether a status is transient
    pub fn is_retryable(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Backoff for `attempt` with a caller-supplied jitter fraction in [0, 0.5].
    pub fn backoff_with_jitter(&self, attempt: u32, jitter: f64) -> Duration {
        let base = self
            .base_delay_ms
            .saturating_mul(1u64 << attempt.min(20))
            .min(self.max_delay_ms);
        let jitter = jitter.clamp(0.0, 0.5);
        Duration::from_millis(base + (base as f64 * jitter) as u64)
    }

    /// Backoff for `attempt` with random jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.0..=0.5);
        self.backoff_with_jitter(attempt, jitter)
    }

    /// Run `call` until it yields a non-retryable status or attempts run out.
    ///
    /// Transport errors are returned immediately. When attempts are exhausted
    /// the last (failed) response is returned for the caller to report.
    pub async fn run<T, F, Fut>(&self, mut call: F, status_of: impl Fn(&T) -> u16) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let response = call().await?;
            let status = status_of(&response);
            attempt += 1;

            if !self.is_retryable(status) || attempt >= max_attempts {
                if self.is_retryable(status) {
                    tracing::warn!(status, attempts = attempt, "retries exhausted");
                }
                return Ok(response);
            }

            let delay = self.backoff(attempt - 1);
            tracing::debug!(
                status,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "transient status, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
