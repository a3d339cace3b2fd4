//! Bounded retry with exponential backoff.
//!
//! Used for classification calls and ledger writes. Errors opt in to retries
//! through [`Transient`]; anything else fails on the first attempt.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Errors that may succeed if the same call is repeated later.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 { 3 }
fn default_initial_backoff_ms() -> u64 { 1_000 }
fn default_max_backoff_ms() -> u64 { 30_000 }

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Result of a retried operation plus the number of calls it took.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let ms = self.initial_backoff_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(ms.min(self.max_backoff_ms))
    }

    /// Run `op` until it succeeds, returns a non-transient error, or
    /// `max_attempts` calls have been made.
    pub async fn run<T, E, F, Fut>(&self, op_name: &str, mut op: F) -> RetryOutcome<T, E>
    where
        E: Transient + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match op().await {
                Ok(value) => return RetryOutcome { result: Ok(value), attempts },
                Err(e) if e.is_transient() && attempts < max_attempts => {
                    let delay = self.backoff_for(attempts);
                    tracing::warn!(
                        op = op_name,
                        error = %e,
                        attempt = attempts,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Transient failure, backing off"
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    tracing::warn!(op = op_name, error = %e, attempts, "Giving up");
                    return RetryOutcome { result: Err(e), attempts };
                }
            }
        }
    }
}
