//! Resumable event streams held in memory
//!
//! A producer appends events for a `(session, message)` pair while a consumer
//! polls with the offset returned by its previous read. Buffers are bounded
//! by size (oldest half dropped) and by idle age (background eviction).

pub mod buffer;
pub mod event;
pub mod manager;

pub use buffer::{StreamBuffer, StreamWindow};
pub use event::{StreamEvent, Timestamped};
pub use manager::{CleanupReport, StreamConfig, StreamManager, StreamStats, StreamStore};
