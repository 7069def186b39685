//! Stream event payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payloads that carry an optional creation timestamp
///
/// The stream buffer stamps events that arrive without one.
pub trait Timestamped {
    fn timestamp(&self) -> Option<DateTime<Utc>>;
    fn set_timestamp(&mut self, at: DateTime<Utc>);
}

/// A single event produced while generating a streamed response
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub done: bool,
}

impl StreamEvent {
    pub fn new(event_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = Some(at);
        self
    }

    /// Mark as the final event of its stream
    pub fn finished(mut self) -> Self {
        self.done = true;
        self
    }
}

impl Timestamped for StreamEvent {
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    fn set_timestamp(&mut self, at: DateTime<Utc>) {
        self.timestamp = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let event = StreamEvent::new("answer", "hello")
            .with_id("evt-1")
            .with_data(serde_json::json!({"tokens": 2}))
            .finished();

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "answer");
        assert_eq!(json["content"], "hello");
        assert_eq!(json["data"]["tokens"], 2);
        assert_eq!(json["done"], true);
        assert!(json.get("timestamp").is_none());
    }

    #[test]
    fn test_minimal_event_deserializes() {
        let event: StreamEvent = serde_json::from_str(r#"{"type":"thinking"}"#).unwrap();

        assert_eq!(event.event_type, "thinking");
        assert!(event.content.is_empty());
        assert!(event.timestamp.is_none());
        assert!(!event.done);
    }
}
