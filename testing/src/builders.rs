//! Builders for test events with sensible defaults.

use chrono::{DateTime, TimeZone, Utc};
use nearcast_core::events::{LocationEvent, ShopProximityEvent};

/// Fixed reference timestamp for deterministic tests
/// (2025-01-01 00:00:00 UTC).
///
/// # Panics
///
/// Never panics in practice; the hardcoded date is valid.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn test_timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

/// Builder for [`LocationEvent`].
///
/// Defaults: central Milan, [`test_timestamp`], a 30-year-old engineer
/// interested in coffee.
#[derive(Debug, Clone)]
pub struct LocationEventBuilder {
    event: LocationEvent,
}

impl LocationEventBuilder {
    /// Start building an event for `user_id`.
    #[must_use]
    pub fn new(user_id: i64) -> Self {
        Self {
            event: LocationEvent {
                user_id,
                latitude: 45.4642,
                longitude: 9.19,
                timestamp: test_timestamp(),
                age: 30,
                profession: "engineer".into(),
                interests: "coffee".into(),
            },
        }
    }

    /// Set the position.
    #[must_use]
    pub const fn position(mut self, latitude: f64, longitude: f64) -> Self {
        self.event.latitude = latitude;
        self.event.longitude = longitude;
        self
    }

    /// Set the timestamp.
    #[must_use]
    pub const fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.event.timestamp = timestamp;
        self
    }

    /// Set the age.
    #[must_use]
    pub const fn age(mut self, age: u32) -> Self {
        self.event.age = age;
        self
    }

    /// Set the profession.
    #[must_use]
    pub fn profession(mut self, profession: impl Into<String>) -> Self {
        self.event.profession = profession.into();
        self
    }

    /// Set the interests.
    #[must_use]
    pub fn interests(mut self, interests: impl Into<String>) -> Self {
        self.event.interests = interests.into();
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> LocationEvent {
        self.event
    }
}

/// Builder for [`ShopProximityEvent`].
///
/// Defaults match [`LocationEventBuilder`], 50 meters from shop 7
/// ("Café Milano", a bar).
#[derive(Debug, Clone)]
pub struct ProximityEventBuilder {
    event: ShopProximityEvent,
}

impl ProximityEventBuilder {
    /// Start building an event for `user_id`.
    #[must_use]
    pub fn new(user_id: i64) -> Self {
        Self {
            event: ShopProximityEvent {
                user_id,
                shop_id: 7,
                shop_name: "Café Milano".into(),
                shop_category: "bar".into(),
                distance: 50.0,
                latitude: 45.4642,
                longitude: 9.19,
                timestamp: test_timestamp(),
                user_age: 30,
                user_profession: "engineer".into(),
                user_interests: "coffee".into(),
            },
        }
    }

    /// Set the shop.
    #[must_use]
    pub fn shop(mut self, shop_id: i64, name: impl Into<String>) -> Self {
        self.event.shop_id = shop_id;
        self.event.shop_name = name.into();
        self
    }

    /// Set the distance in meters.
    #[must_use]
    pub const fn distance(mut self, distance: f64) -> Self {
        self.event.distance = distance;
        self
    }

    /// Set the timestamp.
    #[must_use]
    pub const fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.event.timestamp = timestamp;
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> ShopProximityEvent {
        self.event
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code

    use super::*;

    #[test]
    fn builders_apply_overrides() {
        let location = LocationEventBuilder::new(1)
            .position(44.0, 8.0)
            .age(55)
            .build();
        assert_eq!(location.user_id, 1);
        assert!((location.latitude - 44.0).abs() < f64::EPSILON);
        assert_eq!(location.age, 55);

        let proximity = ProximityEventBuilder::new(2)
            .shop(9, "Libreria Dante")
            .distance(120.0)
            .build();
        assert_eq!(proximity.shop_id, 9);
        assert_eq!(proximity.shop_name, "Libreria Dante");
    }
}
