//! Retry classification for embedding HTTP failures

use crate::error::RequestError;
use kb_resilience::{FailureClassifier, FailureContext, FailureKind};

/// Retries transport errors, 5xx and 429; gives up on everything else
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpStatusClassifier;

impl FailureClassifier for HttpStatusClassifier {
    fn classify(&self, ctx: &FailureContext<'_>) -> FailureKind {
        match ctx.error.downcast_ref::<RequestError>() {
            Some(e) if !e.is_transient() => FailureKind::Permanent,
            _ => FailureKind::Transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::time::Duration;

    fn classify(error: &dyn Any) -> FailureKind {
        HttpStatusClassifier.classify(&FailureContext {
            circuit_name: "openai-embedding-test",
            error,
            attempt: 0,
            duration: Duration::ZERO,
        })
    }

    #[test]
    fn test_http_statuses() {
        assert_eq!(classify(&RequestError::status(502, b"")), FailureKind::Transient);
        assert_eq!(classify(&RequestError::status(429, b"")), FailureKind::Transient);
        assert_eq!(classify(&RequestError::status(404, b"")), FailureKind::Permanent);
    }

    #[test]
    fn test_unknown_errors_are_retried() {
        assert_eq!(classify(&"something else"), FailureKind::Transient);
    }
}
