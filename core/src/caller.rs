//! Retry loop nested inside a circuit breaker
//!
//! One `call` is one breaker execution: all retries of a logical operation
//! happen inside it, so the breaker learns a single outcome per call.

use crate::circuit::CircuitBreaker;
use crate::classifier::{DefaultClassifier, FailureClassifier};
use crate::errors::CircuitError;
use crate::retry::{RetryError, RetryPolicy, retry};
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Outcome of a failed resilient call
#[derive(Debug, thiserror::Error)]
pub enum CallError<E> {
    /// The breaker rejected the call without running it
    #[error("{circuit} temporarily unavailable (circuit breaker open)")]
    Unavailable { circuit: String },
    #[error("{circuit} call cancelled after {attempts} attempt(s)")]
    Cancelled { circuit: String, attempts: u32 },
    #[error("{circuit} call failed after {attempts} attempt(s): {source}")]
    Exhausted {
        circuit: String,
        attempts: u32,
        #[source]
        source: E,
    },
    #[error("{circuit} call rejected on attempt {attempt}: {source}")]
    Permanent {
        circuit: String,
        attempt: u32,
        #[source]
        source: E,
    },
}

impl<E> CallError<E> {
    /// The dependency is unavailable, as opposed to having rejected the request
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CallError::Unavailable { .. })
    }

    /// The last error returned by the operation, if it ran at all
    pub fn source_error(&self) -> Option<&E> {
        match self {
            CallError::Exhausted { source, .. } | CallError::Permanent { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}

/// Client wrapper combining a shared breaker with a retry policy
#[derive(Debug, Clone)]
pub struct ResilientCaller {
    breaker: Arc<CircuitBreaker>,
    policy: RetryPolicy,
    classifier: Arc<dyn FailureClassifier>,
}

impl ResilientCaller {
    /// Retry every failure (see `with_classifier` to stop on permanent errors)
    pub fn new(breaker: Arc<CircuitBreaker>, policy: RetryPolicy) -> Self {
        Self {
            breaker,
            policy,
            classifier: Arc::new(DefaultClassifier),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` with retries inside one breaker execution
    ///
    /// `op` gets the zero-based attempt index and must rebuild its request on
    /// every call. Any error that ends the retry loop, including cancellation,
    /// counts as one breaker failure.
    pub async fn call<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<T, CallError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display + Any,
    {
        let circuit = self.breaker.name();
        let result = self
            .breaker
            .execute(|| retry(&self.policy, self.classifier.as_ref(), circuit, cancel, op))
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(CircuitError::Open { .. } | CircuitError::HalfOpenLimitReached { .. }) => {
                Err(CallError::Unavailable {
                    circuit: circuit.to_string(),
                })
            }
            Err(CircuitError::Execution(RetryError::Cancelled { attempts })) => {
                Err(CallError::Cancelled {
                    circuit: circuit.to_string(),
                    attempts,
                })
            }
            Err(CircuitError::Execution(RetryError::Exhausted { attempts, source })) => {
                tracing::error!(circuit, attempts, error = %source, "all attempts failed");
                Err(CallError::Exhausted {
                    circuit: circuit.to_string(),
                    attempts,
                    source,
                })
            }
            Err(CircuitError::Execution(RetryError::Permanent { attempt, source })) => {
                Err(CallError::Permanent {
                    circuit: circuit.to_string(),
                    attempt,
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{CircuitState, Config};
    use crate::classifier::PredicateClassifier;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn caller(max_failures: usize, max_retries: u32) -> ResilientCaller {
        let breaker = Arc::new(CircuitBreaker::new(
            "upstream",
            Config {
                max_failures,
                open_timeout: Duration::from_secs(60),
                ..Default::default()
            },
        ));
        ResilientCaller::new(
            breaker,
            RetryPolicy {
                max_retries,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                jitter_factor: 0.0,
            },
        )
    }

    #[tokio::test]
    async fn test_retries_count_as_one_breaker_outcome() {
        let caller = caller(2, 3);
        let cancel = CancellationToken::new();

        let result: Result<(), _> = caller.call(&cancel, |_| async { Err("down") }).await;

        assert!(matches!(result, Err(CallError::Exhausted { attempts: 4, .. })));
        // Four failed attempts, one recorded failure
        assert_eq!(caller.breaker().stats().failures, 1);
        assert_eq!(caller.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_recovery_within_retries_is_success() {
        let caller = caller(1, 3);
        let cancel = CancellationToken::new();

        let result = caller
            .call(&cancel, |attempt| async move {
                if attempt == 0 { Err("blip") } else { Ok("ok") }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert!(caller.breaker().is_closed());
    }

    #[tokio::test]
    async fn test_open_breaker_short_circuits() {
        let caller = caller(2, 1);
        let cancel = CancellationToken::new();

        for _ in 0..2 {
            let _: Result<(), _> = caller.call(&cancel, |_| async { Err("down") }).await;
        }
        assert!(caller.breaker().is_open());

        let calls = AtomicU32::new(0);
        let result: Result<(), CallError<&str>> = caller
            .call(&cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(
            err.to_string(),
            "upstream temporarily unavailable (circuit breaker open)"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let caller = caller(5, 3).with_classifier(Arc::new(PredicateClassifier::new(|_| false)));
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = caller
            .call(&cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("invalid input") }
            })
            .await;

        let err = result.unwrap_err();
        assert!(!err.is_unavailable());
        assert_eq!(err.source_error(), Some(&"invalid input"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(caller.breaker().stats().failures, 1);
    }

    #[tokio::test]
    async fn test_cancellation_counts_as_failure() {
        let caller = caller(1, 3);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<(), CallError<&str>> =
            caller.call(&cancel, |_| async { Ok(()) }).await;

        assert!(matches!(result, Err(CallError::Cancelled { attempts: 0, .. })));
        assert!(caller.breaker().is_open());
    }
}
