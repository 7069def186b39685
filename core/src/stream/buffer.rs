//! Per-message event log bounded by size

use super::event::Timestamped;
use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Events read from a buffer, with enough context to resume
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamWindow<E> {
    /// Copy of `events[from_offset..]`
    pub events: Vec<E>,
    /// Offset to pass on the next read
    pub next_offset: usize,
    /// Events discarded by truncation over the buffer's lifetime
    ///
    /// Offsets are not renumbered when the oldest half is dropped, so a reader
    /// that sees this grow between reads may have skipped events.
    pub truncated: u64,
}

impl<E> StreamWindow<E> {
    fn empty(from_offset: usize, truncated: u64) -> Self {
        Self {
            events: Vec::new(),
            next_offset: from_offset,
            truncated,
        }
    }
}

#[derive(Debug)]
struct BufferState<E> {
    events: Vec<E>,
    created_at: Instant,
    last_updated: Instant,
    truncated: u64,
}

/// Append-only event log for one (session, message) pair
#[derive(Debug)]
pub struct StreamBuffer<E> {
    state: RwLock<BufferState<E>>,
    max_events: usize,
}

impl<E: Timestamped + Clone> StreamBuffer<E> {
    pub fn new(max_events: usize) -> Self {
        let now = Instant::now();
        Self {
            state: RwLock::new(BufferState {
                events: Vec::new(),
                created_at: now,
                last_updated: now,
                truncated: 0,
            }),
            max_events: max_events.max(1),
        }
    }

    /// Append an event, stamping it if needed
    ///
    /// A buffer already holding `max_events` first drops its oldest half, so
    /// after the append it holds `max_events / 2 + 1`. Returns how many events
    /// were dropped.
    pub fn append(&self, mut event: E) -> usize {
        if event.timestamp().is_none() {
            event.set_timestamp(Utc::now());
        }

        let mut state = self.state.write();
        let mut dropped = 0;
        if state.events.len() >= self.max_events {
            dropped = state.events.len() - self.max_events / 2;
            state.events.drain(..dropped);
            state.truncated += dropped as u64;
        }
        state.events.push(event);
        state.last_updated = Instant::now();
        dropped
    }

    /// Copy of `events[from_offset..]` and the current length
    ///
    /// An offset at or past the end yields no events and echoes the offset back.
    pub fn read_from(&self, from_offset: usize) -> (Vec<E>, usize) {
        let window = self.window(from_offset);
        (window.events, window.next_offset)
    }

    pub fn window(&self, from_offset: usize) -> StreamWindow<E> {
        let state = self.state.read();
        if from_offset >= state.events.len() {
            return StreamWindow::empty(from_offset, state.truncated);
        }
        StreamWindow {
            events: state.events[from_offset..].to_vec(),
            next_offset: state.events.len(),
            truncated: state.truncated,
        }
    }
}

impl<E> StreamBuffer<E> {
    pub fn len(&self) -> usize {
        self.state.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().events.is_empty()
    }

    pub fn truncated(&self) -> u64 {
        self.state.read().truncated
    }

    /// Time since the last append (or creation, if nothing was appended)
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.state.read().last_updated)
    }

    pub fn age(&self) -> Duration {
        self.state.read().created_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::event::StreamEvent;
    use chrono::TimeZone;

    fn event(n: usize) -> StreamEvent {
        StreamEvent::new("answer", n.to_string())
    }

    #[test]
    fn test_read_from_offsets() {
        let buffer = StreamBuffer::new(100);
        for n in 0..3 {
            buffer.append(event(n));
        }

        let (events, next) = buffer.read_from(0);
        assert_eq!(events.len(), 3);
        assert_eq!(next, 3);

        let (events, next) = buffer.read_from(2);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].content, "2");
        assert_eq!(next, 3);

        let (events, next) = buffer.read_from(7);
        assert!(events.is_empty());
        assert_eq!(next, 7);
    }

    #[test]
    fn test_stamps_missing_timestamp_only() {
        let buffer = StreamBuffer::new(10);
        let fixed = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

        buffer.append(event(0));
        buffer.append(event(1).with_timestamp(fixed));

        let (events, _) = buffer.read_from(0);
        assert!(events[0].timestamp.is_some());
        assert_eq!(events[1].timestamp, Some(fixed));
    }

    #[test]
    fn test_truncation_keeps_newest_half() {
        let buffer = StreamBuffer::new(10);
        for n in 0..10 {
            assert_eq!(buffer.append(event(n)), 0);
        }
        assert_eq!(buffer.append(event(10)), 5);

        assert_eq!(buffer.len(), 6);
        assert_eq!(buffer.truncated(), 5);

        let (events, next) = buffer.read_from(0);
        assert_eq!(next, 6);
        let contents: Vec<&str> = events.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["5", "6", "7", "8", "9", "10"]);
    }

    #[test]
    fn test_truncation_with_odd_limit() {
        let buffer = StreamBuffer::new(7);
        for n in 0..8 {
            buffer.append(event(n));
        }
        // 7 / 2 + 1
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.window(0).truncated, 4);
    }

    #[test]
    fn test_single_event_limit() {
        let buffer = StreamBuffer::new(1);
        buffer.append(event(0));
        buffer.append(event(1));

        let (events, _) = buffer.read_from(0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].content, "1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_time_tracks_last_append() {
        let buffer = StreamBuffer::new(10);
        buffer.append(event(0));

        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(buffer.idle_for(Instant::now()), Duration::from_secs(90));

        buffer.append(event(1));
        assert_eq!(buffer.idle_for(Instant::now()), Duration::ZERO);
        assert_eq!(buffer.age(), Duration::from_secs(90));
    }
}
