//! Event bus abstraction over the broker transport.
//!
//! The pipeline's stages are connected in-process by partitioned worker
//! pools; the bus is the edge where events enter (raw GPS pings) and leave
//! (proximity, notification and analytics events for external consumers such
//! as the dashboard).
//!
//! # Delivery semantics
//!
//! **At-least-once** with commits after in-process handoff: if the process
//! crashes before a commit, events are redelivered. Handlers must therefore
//! be safe to apply twice - the cooldown window suppresses a replayed
//! proximity event once a notification went out, and
//! [`NotificationEvent::derive_id`](crate::events::NotificationEvent::derive_id)
//! gives downstream consumers an idempotency key.
//!
//! # Partitioning
//!
//! [`WireEvent::key`] carries the partitioning key - the user id for all
//! pipeline traffic - so every event for one user lands in one partition and
//! is observed in arrival order. Analytics topics need no cross-user
//! ordering.

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Topic names used by the pipeline.
pub mod topics {
    /// Inbound raw location pings from the producer fleet.
    pub const GPS_STREAM: &str = "gps_stream";
    /// Proximity candidates emitted by the location stage.
    pub const SHOP_PROXIMITY: &str = "shop_proximity_events";
    /// Sent notifications, consumed by the dashboard read path.
    pub const NOTIFICATIONS: &str = "notification_events";
    /// Companion analytics records.
    pub const ANALYTICS: &str = "analytics_events";
}

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum BusError {
    /// Failed to connect to the broker.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish an event to a topic.
    #[error("publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed.
        topic: String,
        /// The reason for failure.
        reason: String,
    },

    /// Failed to subscribe to topics.
    #[error("subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe.
        topics: Vec<String>,
        /// The reason for failure.
        reason: String,
    },

    /// Failed to encode an event payload.
    #[error("serialization failed: {0}")]
    SerializationFailed(String),

    /// Failed to decode an event payload.
    #[error("deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Network or transport error.
    #[error("transport error: {0}")]
    TransportError(String),
}

/// Transport envelope: a typed JSON payload plus its partitioning key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEvent {
    /// Event type tag (e.g. `"LocationEvent"`).
    pub event_type: String,
    /// JSON-encoded event body.
    pub payload: Vec<u8>,
    /// Partitioning key; the user id for pipeline traffic.
    pub key: Option<String>,
}

impl WireEvent {
    /// Envelope a serializable event, keyed by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::SerializationFailed`] if the event cannot be
    /// serialized to JSON.
    pub fn encode<T: Serialize>(
        event_type: impl Into<String>,
        event: &T,
        user_id: i64,
    ) -> Result<Self, BusError> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| BusError::SerializationFailed(e.to_string()))?;
        Ok(Self {
            event_type: event_type.into(),
            payload,
            key: Some(user_id.to_string()),
        })
    }

    /// Decode the JSON payload into a concrete event type.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::DeserializationFailed`] if the payload is not
    /// valid JSON for `T`.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, BusError> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| BusError::DeserializationFailed(e.to_string()))
    }
}

/// Stream of events from subscriptions.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<WireEvent, BusError>> + Send>>;

/// Trait for event bus implementations.
///
/// Uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn` so the
/// bus can be held as `Arc<dyn EventBus>` by the stages.
///
/// # Implementations
///
/// - `KafkaEventBus` (nearcast-kafka) - production transport
/// - `InMemoryEventBus` (nearcast-testing) - fast, in-process
pub trait EventBus: Send + Sync {
    /// Publish an event to a topic with at-least-once semantics.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::PublishFailed`] if the publish operation fails.
    fn publish(
        &self,
        topic: &str,
        event: &WireEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), BusError>> + Send + '_>>;

    /// Subscribe to one or more topics and receive a stream of events.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::SubscriptionFailed`] if subscription fails.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, BusError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code

    use super::*;
    use crate::events::LocationEvent;
    use chrono::{TimeZone, Utc};

    #[test]
    fn encode_decode_round_trips_with_user_key() {
        let event = LocationEvent {
            user_id: 42,
            latitude: 45.4642,
            longitude: 9.19,
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            age: 30,
            profession: "engineer".into(),
            interests: "tech,travel".into(),
        };

        let wire = WireEvent::encode("LocationEvent", &event, event.user_id).unwrap();
        assert_eq!(wire.key.as_deref(), Some("42"));
        assert_eq!(wire.event_type, "LocationEvent");

        let decoded: LocationEvent = wire.decode().unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn encode_reports_unserializable_payloads() {
        // JSON object keys must be strings; a tuple-keyed map cannot encode.
        let bad: std::collections::HashMap<(i32, i32), i32> =
            std::collections::HashMap::from([((1, 2), 3)]);
        assert!(matches!(
            WireEvent::encode("Bad", &bad, 1),
            Err(BusError::SerializationFailed(_))
        ));
    }

    #[test]
    fn decode_rejects_wrong_shape() {
        let wire = WireEvent {
            event_type: "LocationEvent".into(),
            payload: b"{\"nope\": true}".to_vec(),
            key: None,
        };
        assert!(matches!(
            wire.decode::<LocationEvent>(),
            Err(BusError::DeserializationFailed(_))
        ));
    }
}
