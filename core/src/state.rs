//! Per-key mutable state held by the state store.
//!
//! Each value here is owned by exactly one key and replaced atomically on
//! update; there is no historical versioning. [`UserState`] is written by the
//! location and notification stages, [`ShopStats`] by the notification stage,
//! and [`SystemStats`] by the analytics stage only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Maximum number of positions retained in [`UserState::recent_positions`].
pub const MAX_RECENT_POSITIONS: usize = 10;

/// One retained position sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
}

/// Current state for one user, keyed by user id.
///
/// Created lazily on the first event for a user and never deleted. The
/// `recent_notifications` map is the cooldown/dedup window: it records the
/// last notification time per shop and is written only after a fully
/// successful send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserState {
    /// Subject user.
    pub user_id: i64,
    /// Last known latitude.
    pub last_latitude: f64,
    /// Last known longitude.
    pub last_longitude: f64,
    /// Timestamp of the last processed location event.
    pub last_seen: DateTime<Utc>,
    /// Cumulative haversine distance traveled, meters. Monotonically
    /// non-decreasing.
    #[serde(default)]
    pub total_distance: f64,
    /// Count of distinct shop visits recorded.
    #[serde(default)]
    pub shops_visited: u64,
    /// Count of notifications sent to this user.
    #[serde(default)]
    pub notifications_received: u64,
    /// Ring buffer of the last [`MAX_RECENT_POSITIONS`] positions, oldest
    /// first.
    #[serde(default)]
    pub recent_positions: VecDeque<PositionSample>,
    /// Shop id → time of the most recent notification for that shop.
    #[serde(default)]
    pub recent_notifications: HashMap<i64, DateTime<Utc>>,
}

impl UserState {
    /// Seed state from a user's first location event: current position, zero
    /// traveled distance, empty history.
    #[must_use]
    pub fn seeded(user_id: i64, latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            user_id,
            last_latitude: latitude,
            last_longitude: longitude,
            last_seen: timestamp,
            total_distance: 0.0,
            shops_visited: 0,
            notifications_received: 0,
            recent_positions: VecDeque::with_capacity(MAX_RECENT_POSITIONS),
            recent_notifications: HashMap::new(),
        }
    }

    /// Append a position to the ring buffer, evicting the oldest entry once
    /// the buffer holds [`MAX_RECENT_POSITIONS`] samples.
    pub fn push_position(&mut self, sample: PositionSample) {
        if self.recent_positions.len() >= MAX_RECENT_POSITIONS {
            self.recent_positions.pop_front();
        }
        self.recent_positions.push_back(sample);
    }

    /// Record a successfully sent notification for `shop_id` at `sent_at`.
    pub fn record_notification(&mut self, shop_id: i64, sent_at: DateTime<Utc>) {
        self.recent_notifications.insert(shop_id, sent_at);
        self.notifications_received += 1;
    }
}

/// Aggregate statistics for one shop, keyed by shop id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopStats {
    /// Shop this record aggregates.
    pub shop_id: i64,
    /// Display name.
    pub shop_name: String,
    /// Category.
    pub shop_category: String,
    /// Total recorded visits.
    #[serde(default)]
    pub total_visits: u64,
    /// Number of distinct visiting users.
    #[serde(default)]
    pub unique_visitors: u64,
    /// Notifications sent for this shop.
    #[serde(default)]
    pub notifications_sent: u64,
    /// Distinct visiting user ids, backing `unique_visitors`.
    #[serde(default)]
    pub visitors: HashSet<i64>,
    /// Timestamp of the last update.
    pub last_updated: DateTime<Utc>,
}

impl ShopStats {
    /// Create an empty record for a shop.
    #[must_use]
    pub fn new(
        shop_id: i64,
        shop_name: impl Into<String>,
        shop_category: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            shop_id,
            shop_name: shop_name.into(),
            shop_category: shop_category.into(),
            total_visits: 0,
            unique_visitors: 0,
            notifications_sent: 0,
            visitors: HashSet::new(),
            last_updated: now,
        }
    }

    /// Record a notification sent for this shop to `user_id` at `sent_at`.
    ///
    /// A first-time visitor bumps both the visit and the unique-visitor
    /// counters.
    pub fn record_notification(&mut self, user_id: i64, sent_at: DateTime<Utc>) {
        self.notifications_sent += 1;
        self.total_visits += 1;
        if self.visitors.insert(user_id) {
            self.unique_visitors += 1;
        }
        self.last_updated = sent_at;
    }
}

/// Global aggregate statistics: a single continuously-overwritten value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    /// Analytics events processed, of any kind.
    pub total_events_processed: u64,
    /// Analytics events of kind notification.
    pub total_notifications_sent: u64,
    /// Number of users with state in the store.
    pub active_users_count: u64,
    /// Timestamp of the last applied analytics event.
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}
