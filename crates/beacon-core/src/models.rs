//! Domain primitives for the event delivery pipeline.
//!
//! An [`Event`] is an immutable, ordered mapping from string keys to JSON
//! values. The pipeline treats event contents as opaque: they are serialized
//! for transmission and persisted verbatim, never inspected or rewritten.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Logical delivery channel for an event.
///
/// Each kind is bound to its own destination URL and its own independent
/// FIFO queue. Kinds never share ordering or storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// An impression record (exposure/view).
    Impression,
    /// A conversion record (goal/outcome).
    Conversion,
}

impl EventKind {
    /// All kinds, in flush-processing order.
    pub const ALL: [EventKind; 2] = [EventKind::Impression, EventKind::Conversion];

    /// Stable lowercase name, used in logs and storage keys.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Impression => "impression",
            Self::Conversion => "conversion",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single telemetry record queued for delivery.
///
/// Key order is preserved, so the serialized payload is byte-stable across
/// persist/reload round trips.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event(Map<String, Value>);

impl Event {
    /// Creates an empty event.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insertion, preserving insertion order.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Returns the value stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Number of fields in the event.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the event carries no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Serializes the event to its JSON wire payload.
    pub fn to_bytes(&self) -> Bytes {
        // A Map<String, Value> always serializes: keys are strings and
        // values are already JSON.
        Bytes::from(serde_json::to_vec(&self.0).expect("JSON object serialization cannot fail"))
    }
}

impl From<Map<String, Value>> for Event {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(EventKind::Impression.as_str(), "impression");
        assert_eq!(EventKind::Conversion.as_str(), "conversion");
        assert_eq!(EventKind::Impression.to_string(), "impression");
    }

    #[test]
    fn event_preserves_insertion_order() {
        let event = Event::new().with("z", 1).with("a", 2).with("m", 3);

        let keys: Vec<&str> = event.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn event_serializes_ordered_payload() {
        let event = Event::new().with("visitor_id", "v-1").with("revenue", 42);

        let payload = event.to_bytes();
        assert_eq!(payload, Bytes::from_static(br#"{"visitor_id":"v-1","revenue":42}"#));
    }

    #[test]
    fn event_round_trips_through_json() {
        let event = Event::new().with("x", 1).with("nested", serde_json::json!({"k": [1, 2]}));

        let encoded = serde_json::to_string(&event).unwrap();
        let decoded: Event = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, event);
    }
}
