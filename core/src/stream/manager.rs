//! In-memory registry of stream buffers with background eviction

use super::buffer::{StreamBuffer, StreamWindow};
use super::event::{StreamEvent, Timestamped};
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Stream manager limits
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Period of the eviction sweep
    pub cleanup_interval: Duration,
    /// Buffers idle for longer than this are evicted
    pub max_age: Duration,
    /// Upper bound on events held by one buffer
    pub max_events_per_buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(5 * 60),
            max_age: Duration::from_secs(30 * 60),
            max_events_per_buffer: 10_000,
        }
    }
}

impl StreamConfig {
    /// Replace zero values with the defaults
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if self.cleanup_interval.is_zero() {
            self.cleanup_interval = defaults.cleanup_interval;
        }
        if self.max_age.is_zero() {
            self.max_age = defaults.max_age;
        }
        if self.max_events_per_buffer == 0 {
            self.max_events_per_buffer = defaults.max_events_per_buffer;
        }
        self
    }
}

/// Result of one eviction sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub removed_sessions: usize,
    pub removed_buffers: usize,
    pub remaining_sessions: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub sessions: usize,
    pub buffers: usize,
    pub total_events: usize,
}

/// Producer/consumer seam for streamed events
///
/// Producers append as they generate; consumers poll with the offset returned
/// by their previous read.
pub trait StreamStore<E>: Send + Sync {
    fn append_event(&self, session_id: &str, message_id: &str, event: E);

    /// Events from `from_offset` on, plus the offset to resume from
    fn get_events(&self, session_id: &str, message_id: &str, from_offset: usize) -> (Vec<E>, usize);
}

type Sessions<E> = HashMap<String, HashMap<String, Arc<StreamBuffer<E>>>>;

#[derive(Debug)]
struct Shared<E> {
    sessions: RwLock<Sessions<E>>,
    config: StreamConfig,
}

impl<E> Shared<E> {
    fn cleanup(&self) -> CleanupReport {
        let now = Instant::now();
        let max_age = self.config.max_age;
        let mut report = CleanupReport::default();

        let mut sessions = self.sessions.write();
        sessions.retain(|session_id, messages| {
            messages.retain(|message_id, buffer| {
                let expired = buffer.idle_for(now) > max_age;
                if expired {
                    tracing::debug!(session_id = %session_id, message_id = %message_id, "evicting idle stream");
                    report.removed_buffers += 1;
                }
                !expired
            });

            if messages.is_empty() {
                report.removed_sessions += 1;
                false
            } else {
                true
            }
        });
        report.remaining_sessions = sessions.len();

        if report.removed_sessions > 0 || report.removed_buffers > 0 {
            tracing::info!(
                removed_sessions = report.removed_sessions,
                removed_buffers = report.removed_buffers,
                remaining_sessions = report.remaining_sessions,
                "stream cleanup completed"
            );
        }
        report
    }
}

/// Owns every stream buffer, keyed by session then message
///
/// Buffers are created on first append and evicted once idle for longer than
/// `max_age`. Dropping the manager stops the sweep; `close` also waits for it.
#[derive(Debug)]
pub struct StreamManager<E = StreamEvent> {
    shared: Arc<Shared<E>>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<E> StreamManager<E>
where
    E: Timestamped + Clone + Send + Sync + 'static,
{
    /// Manager with default limits
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime (the sweep is spawned here).
    pub fn new() -> Self {
        Self::with_config(StreamConfig::default())
    }

    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime (the sweep is spawned here).
    pub fn with_config(config: StreamConfig) -> Self {
        let shared = Arc::new(Shared {
            sessions: RwLock::new(HashMap::new()),
            config: config.normalized(),
        });
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(cleanup_loop(Arc::clone(&shared), shutdown.clone()));

        Self {
            shared,
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.shared.config
    }

    pub fn append_event(&self, session_id: &str, message_id: &str, event: E) {
        let sessions = self.shared.sessions.read();
        if let Some(buffer) = sessions.get(session_id).and_then(|m| m.get(message_id)) {
            let dropped = buffer.append(event);
            log_truncation(session_id, message_id, dropped, buffer.len());
            return;
        }
        drop(sessions);

        let mut sessions = self.shared.sessions.write();
        let max_events = self.shared.config.max_events_per_buffer;
        let buffer = sessions
            .entry(session_id.to_string())
            .or_default()
            .entry(message_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session_id, message_id, "stream buffer created");
                Arc::new(StreamBuffer::new(max_events))
            })
            .clone();

        // Keep the map shared-locked so a sweep cannot evict the buffer mid-append
        let _sessions = RwLockWriteGuard::downgrade(sessions);
        let dropped = buffer.append(event);
        log_truncation(session_id, message_id, dropped, buffer.len());
    }

    /// Events from `from_offset` on and the resume offset; a missing stream reads as empty
    pub fn get_events(&self, session_id: &str, message_id: &str, from_offset: usize) -> (Vec<E>, usize) {
        let window = self.get_window(session_id, message_id, from_offset);
        (window.events, window.next_offset)
    }

    pub fn get_window(&self, session_id: &str, message_id: &str, from_offset: usize) -> StreamWindow<E> {
        let sessions = self.shared.sessions.read();
        match sessions.get(session_id).and_then(|m| m.get(message_id)) {
            Some(buffer) => buffer.window(from_offset),
            None => StreamWindow {
                events: Vec::new(),
                next_offset: from_offset,
                truncated: 0,
            },
        }
    }

    /// Run one eviction sweep now
    pub fn cleanup_now(&self) -> CleanupReport {
        self.shared.cleanup()
    }

    pub fn stats(&self) -> StreamStats {
        let sessions = self.shared.sessions.read();
        let mut stats = StreamStats {
            sessions: sessions.len(),
            ..Default::default()
        };
        for messages in sessions.values() {
            stats.buffers += messages.len();
            stats.total_events += messages.values().map(|b| b.len()).sum::<usize>();
        }
        stats
    }

    /// Stop the eviction sweep and wait for it to exit
    pub async fn close(&self) {
        self.shutdown.cancel();
        let worker = self.worker.lock().take();
        let Some(worker) = worker else {
            return;
        };
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "stream cleanup task failed");
        }
    }
}

impl<E> Default for StreamManager<E>
where
    E: Timestamped + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Drop for StreamManager<E> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl<E> StreamStore<E> for StreamManager<E>
where
    E: Timestamped + Clone + Send + Sync + 'static,
{
    fn append_event(&self, session_id: &str, message_id: &str, event: E) {
        StreamManager::append_event(self, session_id, message_id, event)
    }

    fn get_events(&self, session_id: &str, message_id: &str, from_offset: usize) -> (Vec<E>, usize) {
        StreamManager::get_events(self, session_id, message_id, from_offset)
    }
}

fn log_truncation(session_id: &str, message_id: &str, dropped: usize, kept: usize) {
    if dropped > 0 {
        tracing::warn!(session_id, message_id, dropped, kept, "stream buffer full, oldest events dropped");
    }
}

async fn cleanup_loop<E>(shared: Arc<Shared<E>>, shutdown: CancellationToken) {
    let period = shared.config.cleanup_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        interval_secs = period.as_secs(),
        max_age_secs = shared.config.max_age.as_secs(),
        "stream cleanup loop started"
    );

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("stream cleanup loop stopped");
                return;
            }
            _ = ticker.tick() => {
                shared.cleanup();
            }
        }
    }
}
