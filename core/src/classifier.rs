//! Failure classification for retry decisions
//!
//! A classifier decides whether a failed attempt is worth repeating. Transient
//! failures (timeouts, overloaded upstreams) are retried with backoff;
//! permanent ones (bad input, rejected credentials) end the call at once.

use std::any::Any;
use std::time::Duration;

/// Verdict for a single failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Worth another attempt after backoff
    Transient,
    /// Retrying cannot help
    Permanent,
}

/// Context provided to failure classifiers for error evaluation
#[derive(Debug)]
pub struct FailureContext<'a> {
    /// Circuit name
    pub circuit_name: &'a str,
    /// The error that occurred (can be downcast to specific types)
    pub error: &'a dyn Any,
    /// Zero-based attempt index
    pub attempt: u32,
    /// Duration of the failed attempt
    pub duration: Duration,
}

/// Trait for classifying failures - determines if an error is worth retrying
///
/// # Examples
///
/// ```rust
/// use kb_resilience::{FailureClassifier, FailureContext, FailureKind};
///
/// #[derive(Debug)]
/// struct NotFoundIsFinal;
///
/// impl FailureClassifier for NotFoundIsFinal {
///     fn classify(&self, ctx: &FailureContext<'_>) -> FailureKind {
///         match ctx.error.downcast_ref::<std::io::Error>() {
///             Some(e) if e.kind() == std::io::ErrorKind::NotFound => FailureKind::Permanent,
///             _ => FailureKind::Transient,
///         }
///     }
/// }
/// ```
pub trait FailureClassifier: Send + Sync + std::fmt::Debug {
    fn classify(&self, ctx: &FailureContext<'_>) -> FailureKind;
}

/// Default classifier that retries every error
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl FailureClassifier for DefaultClassifier {
    fn classify(&self, _ctx: &FailureContext<'_>) -> FailureKind {
        FailureKind::Transient
    }
}

/// Predicate-based classifier using a closure
///
/// The predicate returns `true` when the failure is transient.
pub struct PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    predicate: F,
}

impl<F> PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    /// Create a new predicate-based classifier
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> FailureClassifier for PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    fn classify(&self, ctx: &FailureContext<'_>) -> FailureKind {
        if (self.predicate)(ctx) {
            FailureKind::Transient
        } else {
            FailureKind::Permanent
        }
    }
}

impl<F> std::fmt::Debug for PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateClassifier")
            .field("predicate", &"<closure>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_classifier_retries_all() {
        let classifier = DefaultClassifier;
        let ctx = FailureContext {
            circuit_name: "test",
            error: &"any error" as &dyn Any,
            attempt: 0,
            duration: Duration::from_millis(100),
        };

        assert_eq!(classifier.classify(&ctx), FailureKind::Transient);
    }

    #[test]
    fn test_predicate_classifier() {
        // Slow failures are treated as overload and retried
        let classifier =
            PredicateClassifier::new(|ctx| ctx.duration > Duration::from_secs(1));

        let fast_ctx = FailureContext {
            circuit_name: "test",
            error: &"fast error" as &dyn Any,
            attempt: 0,
            duration: Duration::from_millis(500),
        };

        let slow_ctx = FailureContext {
            circuit_name: "test",
            error: &"slow error" as &dyn Any,
            attempt: 1,
            duration: Duration::from_secs(2),
        };

        assert_eq!(classifier.classify(&fast_ctx), FailureKind::Permanent);
        assert_eq!(classifier.classify(&slow_ctx), FailureKind::Transient);
    }

    #[test]
    fn test_error_type_downcast() {
        #[derive(Debug)]
        struct UpstreamError {
            status: u16,
        }

        let unavailable = UpstreamError { status: 503 };
        let bad_request = UpstreamError { status: 400 };

        let classifier = PredicateClassifier::new(|ctx| {
            ctx.error
                .downcast_ref::<UpstreamError>()
                .map(|e| e.status >= 500 || e.status == 429)
                .unwrap_or(true) // Retry unknown errors
        });

        let server_ctx = FailureContext {
            circuit_name: "test",
            error: &unavailable as &dyn Any,
            attempt: 0,
            duration: Duration::ZERO,
        };

        let client_ctx = FailureContext {
            circuit_name: "test",
            error: &bad_request as &dyn Any,
            attempt: 0,
            duration: Duration::ZERO,
        };

        assert_eq!(classifier.classify(&server_ctx), FailureKind::Transient);
        assert_eq!(classifier.classify(&client_ctx), FailureKind::Permanent);
    }
}
