//! Bounded retry with exponential backoff.
//!
//! A provider call is attempted once, then retried up to `max_retries` times
//! when it either fails with a transient error or succeeds without producing
//! any output (a cold start on Replicate, an empty candidate on Gemini).
//! Retry `n` (starting at 1) waits `2^n` backoff units first, so the default
//! policy sleeps 2s then 4s.
//!
//! What to do once the budget runs out is left to each endpoint.

use std::time::Duration;

use crate::config::RetryConfig;

/// Classifies an error as worth retrying.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// A call that completed, classified by whether it produced output.
#[derive(Debug)]
pub enum Attempt<T> {
    /// Usable result (including terminal upstream failures); stop here.
    Ready(T),
    /// The call worked but produced nothing; retry while budget remains.
    Empty(T),
}

/// Retry budget and backoff unit.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_unit: Duration::from_millis(config.backoff_unit_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): `2^retry` units.
    pub fn backoff(&self, retry: u32) -> Duration {
        self.backoff_unit
            .saturating_mul(2u32.saturating_pow(retry))
    }
}

/// How the retry loop ended.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    Success(T),
    /// Every attempt came back empty; carries the last empty result.
    ExhaustedEmpty(T),
    /// A non-transient error, or a transient one on the final attempt.
    Failed(E),
}

/// Result of the loop plus the number of calls made.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: RetryResult<T, E>,
    pub attempts: u32,
}

/// Run `call` until it yields a ready result, fails terminally, or the
/// retry budget is spent. `call` receives the 1-based attempt number.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: &RetryPolicy, mut call: F) -> RetryOutcome<T, E>
where
    E: Transient + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = std::result::Result<Attempt<T>, E>>,
{
    let mut retries = 0;

    loop {
        let attempt = retries + 1;
        let exhausted = retries >= policy.max_retries;

        match call(attempt).await {
            Ok(Attempt::Ready(value)) => {
                return RetryOutcome {
                    result: RetryResult::Success(value),
                    attempts: attempt,
                };
            }
            Ok(Attempt::Empty(value)) => {
                if exhausted {
                    tracing::warn!(attempts = attempt, "Retries exhausted with empty output");
                    return RetryOutcome {
                        result: RetryResult::ExhaustedEmpty(value),
                        attempts: attempt,
                    };
                }
                tracing::info!(attempt, "Provider returned empty output, retrying");
            }
            Err(err) => {
                if !err.is_transient() || exhausted {
                    tracing::warn!(attempts = attempt, error = %err, "Provider call failed");
                    return RetryOutcome {
                        result: RetryResult::Failed(err),
                        attempts: attempt,
                    };
                }
                tracing::warn!(attempt, error = %err, "Transient provider error, retrying");
            }
        }

        retries += 1;
        tokio::time::sleep(policy.backoff(retries)).await;
    }
}
