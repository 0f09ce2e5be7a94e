use crate::error::{Error, Result};
use crate::tag::Tag;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// An opaque structured value with a preserved run-time type
/// discriminator. The discriminator is a stable short
/// string; the value is stored verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(rename = "$type")]
    pub type_tag: String,
    pub value: serde_json::Value,
}

impl Payload {
    pub fn new(type_tag: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            type_tag: type_tag.into(),
            value,
        }
    }
}

/// `{ timestamp, correlation_id, causation_id, ... }`.
/// `timestamp` defaults to the wall clock at append time if unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none", with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<Uuid>,
}

impl Metadata {
    /// Stamp the timestamp with `now` if unset; leave a pre-set
    /// timestamp verbatim.
    pub fn stamp_if_unset(&mut self, now: OffsetDateTime) {
        if self.timestamp.is_none() {
            self.timestamp = Some(now);
        }
    }
}

/// `{ event_type, payload, tags }`. `tags` has no duplicate
/// keys within an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event_type: String,
    pub payload: Payload,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl DomainEvent {
    pub fn new(
        event_type: impl Into<String>,
        payload: Payload,
        tags: Vec<Tag>,
    ) -> Result<Self> {
        let event_type = event_type.into();
        if event_type.is_empty() {
            return Err(Error::InvalidArgument {
                reason: "event_type must be non-empty".to_string(),
            });
        }
        let mut seen = std::collections::HashSet::new();
        for tag in &tags {
            if !seen.insert(&tag.key) {
                return Err(Error::InvalidArgument {
                    reason: format!("duplicate tag key {:?} within event", tag.key),
                });
            }
        }
        Ok(Self {
            event_type,
            payload,
            tags,
        })
    }
}

/// Write input: a domain event plus metadata, carrying no position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub event: DomainEvent,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewEvent {
    pub fn new(event: DomainEvent) -> Self {
        Self {
            event,
            metadata: Metadata::default(),
        }
    }

    pub fn with_metadata(event: DomainEvent, metadata: Metadata) -> Self {
        Self { event, metadata }
    }
}

/// Read output / persisted form: a `NewEvent` with an assigned,
/// immutable, monotonically increasing `position >= 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencedEvent {
    pub position: u64,
    pub event: DomainEvent,
    pub metadata: Metadata,
}

impl SequencedEvent {
    pub fn new(position: u64, event: DomainEvent, metadata: Metadata) -> Self {
        Self {
            position,
            event,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_event_type() {
        let payload = Payload::new("test.v1", serde_json::json!({}));
        assert!(DomainEvent::new("", payload, vec![]).is_err());
    }

    #[test]
    fn rejects_duplicate_tag_keys() {
        let payload = Payload::new("test.v1", serde_json::json!({}));
        let tags = vec![Tag::new("a", "1").unwrap(), Tag::new("a", "2").unwrap()];
        assert!(DomainEvent::new("T", payload, tags).is_err());
    }

    #[test]
    fn stamp_if_unset_preserves_preset_timestamp() {
        let preset = OffsetDateTime::from_unix_timestamp(1_000).unwrap();
        let mut meta = Metadata {
            timestamp: Some(preset),
            ..Default::default()
        };
        meta.stamp_if_unset(OffsetDateTime::from_unix_timestamp(2_000).unwrap());
        assert_eq!(meta.timestamp, Some(preset));
    }

    #[test]
    fn stamp_if_unset_fills_missing_timestamp() {
        let mut meta = Metadata::default();
        let now = OffsetDateTime::from_unix_timestamp(5_000).unwrap();
        meta.stamp_if_unset(now);
        assert_eq!(meta.timestamp, Some(now));
    }

    #[test]
    fn round_trips_through_json() {
        let payload = Payload::new("test.v1", serde_json::json!({"id": "a"}));
        let event = DomainEvent::new(
            "Created",
            payload,
            vec![Tag::new("entity", "a").unwrap()],
        )
        .unwrap();
        let sequenced = SequencedEvent::new(1, event.clone(), Metadata::default());
        let json = serde_json::to_string(&sequenced).unwrap();
        let back: SequencedEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.position, 1);
        assert_eq!(back.event, event);
    }
}
