// src/retry.rs
//! Bounded exponential backoff used while waiting for a user operation to be mined.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time;
use tracing::debug;

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Number of polls before giving up.
    pub max_retries: u32,
    /// Wait before the first poll.
    pub interval_ms: u64,
    /// Factor applied to the wait after every unsuccessful poll.
    pub multiplier: f64,
    /// Upper bound of random jitter added to each wait.
    pub max_jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 10, interval_ms: 5000, multiplier: 1.5, max_jitter_ms: 0 }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, interval_ms: u64, multiplier: f64) -> Self {
        Self { max_retries, interval_ms, multiplier, max_jitter_ms: 0 }
    }

    pub fn with_jitter(mut self, max_jitter_ms: u64) -> Self {
        self.max_jitter_ms = max_jitter_ms;
        self
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if !self.multiplier.is_finite() || self.multiplier <= 0.0 {
            return Err(ClientError::Configuration(format!(
                "retry multiplier must be a positive finite number, got {}",
                self.multiplier
            )));
        }
        Ok(())
    }

    /// `interval_ms * multiplier^attempt`, without jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        Duration::from_millis((self.interval_ms as f64 * factor).round() as u64)
    }
}

/// Polls `probe` up to `policy.max_retries` times, sleeping `delay_for(attempt)` before
/// each poll. `Ok(Some(_))` stops at the first ready answer, `Ok(None)` means the budget
/// ran out, and the first probe error stops the loop.
pub async fn poll_with_backoff<Func, Fut, Out, Err>(
    description: &str,
    policy: &RetryPolicy,
    mut probe: Func,
) -> Result<Option<Out>, Err>
where
    Func: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<Out>, Err>>,
{
    for attempt in 0..policy.max_retries {
        let jitter = if policy.max_jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=policy.max_jitter_ms)
        } else {
            0
        };
        time::sleep(policy.delay_for(attempt) + Duration::from_millis(jitter)).await;

        if let Some(out) = probe().await? {
            return Ok(Some(out));
        }
        debug!("{} not ready (attempt {}/{})", description, attempt + 1, policy.max_retries);
    }
    Ok(None)
}
