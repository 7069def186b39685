//! kb-resilience - failure isolation and resumable streams for service backends
//!
//! This crate provides:
//! - A circuit breaker state machine per named dependency (Closed → Open → HalfOpen)
//! - A registry handing out one shared breaker per name
//! - Bounded retries with capped exponential backoff, nested inside one breaker call
//! - In-memory event stream buffers with size and age limits
//!
//! # Example
//!
//! ```rust,no_run
//! use kb_resilience::{CircuitBreakerRegistry, ResilientCaller, RetryPolicy};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() {
//! let registry = CircuitBreakerRegistry::new();
//! let caller = ResilientCaller::new(registry.get("search"), RetryPolicy::default());
//! let cancel = CancellationToken::new();
//!
//! let result = caller
//!     .call(&cancel, |attempt| async move {
//!         // Your service call here
//!         Ok::<_, String>(format!("answered on attempt {}", attempt))
//!     })
//!     .await;
//!
//! match result {
//!     Ok(answer) => println!("{}", answer),
//!     Err(e) if e.is_unavailable() => println!("search is down, degrade gracefully"),
//!     Err(e) => println!("search failed: {}", e),
//! }
//! # }
//! ```

pub mod builder;
pub mod caller;
pub mod callbacks;
pub mod circuit;
pub mod classifier;
pub mod errors;
pub mod registry;
pub mod retry;
pub mod settings;
pub mod storage;
pub mod stream;

pub use builder::CircuitBuilder;
pub use caller::{CallError, ResilientCaller};
pub use callbacks::Callbacks;
pub use circuit::{CircuitBreaker, CircuitState, CircuitStats, Config};
pub use classifier::{
    DefaultClassifier, FailureClassifier, FailureContext, FailureKind, PredicateClassifier,
};
pub use errors::CircuitError;
pub use registry::CircuitBreakerRegistry;
pub use retry::{RetryError, RetryPolicy, retry};
pub use settings::{Settings, SettingsError};
pub use storage::OutcomeStore;
pub use stream::{
    CleanupReport, StreamBuffer, StreamConfig, StreamEvent, StreamManager, StreamStats,
    StreamStore, StreamWindow, Timestamped,
};
