//! OpenAI-compatible embedding client protected by a circuit breaker
//!
//! ```rust,no_run
//! use kb_resilience::CircuitBreakerRegistry;
//! use kb_resilience_embedding::{EmbedderConfig, OpenAiEmbedder};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), kb_resilience_embedding::EmbeddingError> {
//! let registry = CircuitBreakerRegistry::new();
//! let embedder = OpenAiEmbedder::new(
//!     EmbedderConfig::new("sk-...", "text-embedding-3-small").with_dimensions(1536),
//!     &registry,
//! )?;
//!
//! let vector = embedder.embed("hello world", &CancellationToken::new()).await?;
//! assert_eq!(vector.len(), embedder.dimensions());
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod error;
pub mod openai;

pub use classifier::HttpStatusClassifier;
pub use error::{EmbeddingError, RequestError};
pub use openai::{EmbedderConfig, OpenAiEmbedder};
