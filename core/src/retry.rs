//! Bounded retries with capped exponential backoff
//!
//! Attempt 0 runs immediately. Attempt `i >= 1` first waits
//! `min(2^(i-1) * base_delay, max_delay)`. Every wait and every attempt is
//! raced against a `CancellationToken`, so a cancelled caller returns at once.

use crate::classifier::{FailureClassifier, FailureContext, FailureKind};
use std::any::Any;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = max_retries + 1)
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Jitter factor for delays (0.0 = no jitter, 1.0 = full jitter)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            jitter_factor: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before `attempt` (zero-based); capped and monotonic when jitter is off
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);

        if self.jitter_factor > 0.0 {
            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            let policy = chrono_machines::Policy {
                max_attempts: 1,
                base_delay_ms: delay_ms,
                multiplier: 1.0,
                max_delay_ms: delay_ms,
            };
            Duration::from_millis(policy.calculate_delay(1, self.jitter_factor.clamp(0.0, 1.0)))
        } else {
            delay
        }
    }
}

/// Why a retried operation gave up
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
    #[error("gave up after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },
    #[error("permanent failure on attempt {attempt}: {source}")]
    Permanent {
        attempt: u32,
        #[source]
        source: E,
    },
}

/// Run `op` until it succeeds, fails permanently, runs out of attempts or is cancelled
///
/// `op` receives the zero-based attempt index and must build a fresh request
/// each time. `circuit` only labels log lines and classifier context.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    classifier: &dyn FailureClassifier,
    circuit: &str,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display + Any,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled { attempts: attempt });
        }

        let started = tokio::time::Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(RetryError::Cancelled { attempts: attempt + 1 });
            }
            outcome = op(attempt) => outcome,
        };

        let error = match outcome {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let kind = classifier.classify(&FailureContext {
            circuit_name: circuit,
            error: &error as &dyn Any,
            attempt,
            duration: started.elapsed(),
        });
        if kind == FailureKind::Permanent {
            tracing::debug!(circuit, attempt, error = %error, "permanent failure, not retrying");
            return Err(RetryError::Permanent {
                attempt,
                source: error,
            });
        }

        attempt += 1;
        if attempt >= max_attempts {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                source: error,
            });
        }

        let delay = policy.backoff(attempt);
        tracing::warn!(
            circuit,
            attempt,
            max_attempts,
            backoff_ms = delay.as_millis() as u64,
            error = %error,
            "attempt failed, retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(RetryError::Cancelled { attempts: attempt });
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
