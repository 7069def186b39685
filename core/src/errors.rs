//! Error types for circuit breaker operations

use std::time::Duration;

/// Errors that can occur during circuit breaker operations
#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    /// Circuit is open, calls are being rejected
    #[error("circuit '{circuit}' is open (next probe in {retry_in:?})")]
    Open { circuit: String, retry_in: Duration },
    /// Half-open probe budget has been spent
    #[error("circuit '{circuit}' half-open request limit reached")]
    HalfOpenLimitReached { circuit: String },
    /// The wrapped operation failed
    #[error("circuit execution failed: {0}")]
    Execution(#[source] E),
}

impl<E> CircuitError<E> {
    /// True when the breaker refused the call without running it
    pub fn is_rejection(&self) -> bool {
        !matches!(self, CircuitError::Execution(_))
    }

    /// Unwrap the operation's own error, if the call got that far
    pub fn into_execution(self) -> Option<E> {
        match self {
            CircuitError::Execution(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_classification() {
        let open: CircuitError<std::io::Error> = CircuitError::Open {
            circuit: "api".to_string(),
            retry_in: Duration::from_secs(3),
        };
        let limit: CircuitError<std::io::Error> = CircuitError::HalfOpenLimitReached {
            circuit: "api".to_string(),
        };
        let exec = CircuitError::Execution(std::io::Error::other("boom"));

        assert!(open.is_rejection());
        assert!(limit.is_rejection());
        assert!(!exec.is_rejection());
    }

    #[test]
    fn test_display_names_circuit() {
        let err: CircuitError<std::io::Error> = CircuitError::HalfOpenLimitReached {
            circuit: "payments".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "circuit 'payments' half-open request limit reached"
        );
    }

    #[test]
    fn test_execution_source_is_preserved() {
        use std::error::Error;

        let err = CircuitError::Execution(std::io::Error::other("disk full"));
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("disk full"));
        assert_eq!(err.into_execution().map(|e| e.to_string()).as_deref(), Some("disk full"));
    }
}
