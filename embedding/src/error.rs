//! Error types for the embedding client

use kb_resilience::CallError;
use thiserror::Error;

/// Longest error body kept in a `Status` error
const MAX_ERROR_BODY: usize = 512;

/// Failure of a single HTTP attempt
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed embedding response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RequestError {
    pub(crate) fn status(status: u16, body: &[u8]) -> Self {
        let mut body = String::from_utf8_lossy(body).into_owned();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        RequestError::Status { status, body }
    }

    /// Whether another attempt could succeed
    ///
    /// Connection problems, timeouts, 5xx and 429 are transient; other 4xx
    /// and unparseable success bodies are not.
    pub fn is_transient(&self) -> bool {
        match self {
            RequestError::Transport(e) => !e.is_builder(),
            RequestError::Status { status, .. } => *status >= 500 || *status == 429,
            RequestError::Decode(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("invalid embedder configuration: {0}")]
    Config(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("embedding service temporarily unavailable (circuit breaker open)")]
    Unavailable { circuit: String },

    #[error("embedding request cancelled")]
    Cancelled,

    #[error("embedding request failed after {attempts} attempt(s): {source}")]
    Failed {
        attempts: u32,
        #[source]
        source: RequestError,
    },

    #[error("embedding request rejected: {source}")]
    Rejected {
        #[source]
        source: RequestError,
    },

    #[error("no embedding returned")]
    NoEmbedding,
}

impl EmbeddingError {
    /// The service is unavailable, as opposed to having rejected the request
    pub fn is_unavailable(&self) -> bool {
        matches!(self, EmbeddingError::Unavailable { .. })
    }
}

impl From<CallError<RequestError>> for EmbeddingError {
    fn from(err: CallError<RequestError>) -> Self {
        match err {
            CallError::Unavailable { circuit } => EmbeddingError::Unavailable { circuit },
            CallError::Cancelled { .. } => EmbeddingError::Cancelled,
            CallError::Exhausted {
                attempts, source, ..
            } => EmbeddingError::Failed { attempts, source },
            CallError::Permanent { source, .. } => EmbeddingError::Rejected { source },
        }
    }
}
