//! Event types flowing through the pipeline.
//!
//! Every record is JSON on the wire (the inbound producer and the dashboard
//! both speak JSON), so all types here derive serde with stable field names.
//!
//! The flow is strictly forward:
//!
//! 1. [`LocationEvent`] - one per raw GPS sample, carries a profile snapshot
//!    so downstream stages need no extra lookup.
//! 2. [`ShopProximityEvent`] - zero or many per location event, one per shop
//!    within the proximity radius.
//! 3. [`NotificationEvent`] - terminal record of a successful notification
//!    decision.
//! 4. [`AnalyticsEvent`] - companion record feeding the aggregate statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A raw user position sample with the profile attributes needed downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationEvent {
    /// Subject user.
    pub user_id: i64,
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
    /// User age, carried for personalization.
    pub age: u32,
    /// User profession, carried for personalization.
    pub profession: String,
    /// Free-text interests, carried for personalization.
    pub interests: String,
}

/// Assertion that a user is within threshold distance of a shop.
///
/// One instance per (location event, nearby shop) pair; a single ping can fan
/// out to many of these, or none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopProximityEvent {
    /// Subject user.
    pub user_id: i64,
    /// Shop the user is close to.
    pub shop_id: i64,
    /// Display name of the shop.
    pub shop_name: String,
    /// Shop category (bar, bookstore, ...).
    pub shop_category: String,
    /// Distance from the user to the shop, meters.
    pub distance: f64,
    /// Triggering latitude.
    pub latitude: f64,
    /// Triggering longitude.
    pub longitude: f64,
    /// Timestamp of the triggering location event.
    pub timestamp: DateTime<Utc>,
    /// User age for personalization.
    pub user_age: u32,
    /// User profession for personalization.
    pub user_profession: String,
    /// User interests for personalization.
    pub user_interests: String,
}

/// Terminal record of a notification that was actually sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Unique id, `"{user_id}_{shop_id}_{unix_ts}"`. Doubles as the
    /// idempotency key under at-least-once redelivery.
    pub event_id: String,
    /// Subject user.
    pub user_id: i64,
    /// Shop the notification is about.
    pub shop_id: i64,
    /// Display name of the shop.
    pub shop_name: String,
    /// Shop category.
    pub shop_category: String,
    /// The generated (or fallback) message text.
    pub message: String,
    /// Distance from the user to the shop, meters.
    pub distance: f64,
    /// Triggering latitude.
    pub latitude: f64,
    /// Triggering longitude.
    pub longitude: f64,
    /// Timestamp of the triggering proximity event.
    pub timestamp: DateTime<Utc>,
    /// Whether the message came from the cache.
    #[serde(default)]
    pub from_cache: bool,
    /// Generator call latency in milliseconds; zero/absent on cache hits.
    #[serde(default)]
    pub generation_time_ms: Option<f64>,
}

impl NotificationEvent {
    /// Derive the unique event id for a (user, shop, timestamp) triple.
    #[must_use]
    pub fn derive_id(user_id: i64, shop_id: i64, timestamp: DateTime<Utc>) -> String {
        format!("{user_id}_{shop_id}_{}", timestamp.timestamp())
    }
}

/// Discriminant for [`AnalyticsEvent`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsKind {
    /// A location sample was processed.
    Location,
    /// A notification was sent.
    Notification,
    /// A shop visit was recorded.
    ShopVisit,
}

/// Free-form analytics record used to update the aggregate statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    /// What kind of event this records.
    pub event_type: AnalyticsKind,
    /// Subject user.
    pub user_id: i64,
    /// Shop involved, if any.
    #[serde(default)]
    pub shop_id: Option<i64>,
    /// Category of the shop involved, if any.
    #[serde(default)]
    pub shop_category: Option<String>,
    /// Distance involved, if any, meters.
    #[serde(default)]
    pub distance: Option<f64>,
    /// When the underlying event happened.
    pub timestamp: DateTime<Utc>,
    /// Free-form metadata (cache-hit flag, generation latency, ...).
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl AnalyticsEvent {
    /// Build the companion analytics record for a sent notification.
    #[must_use]
    pub fn for_notification(notification: &NotificationEvent) -> Self {
        let mut metadata = serde_json::Map::new();
        metadata.insert("from_cache".into(), notification.from_cache.into());
        metadata.insert(
            "generation_time_ms".into(),
            notification.generation_time_ms.into(),
        );
        metadata.insert(
            "message_length".into(),
            (notification.message.len() as u64).into(),
        );

        Self {
            event_type: AnalyticsKind::Notification,
            user_id: notification.user_id,
            shop_id: Some(notification.shop_id),
            shop_category: Some(notification.shop_category.clone()),
            distance: Some(notification.distance),
            timestamp: notification.timestamp,
            metadata,
        }
    }
}
