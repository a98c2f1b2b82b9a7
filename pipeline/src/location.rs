//! Location stage: position tracking and proximity fan-out.

use crate::metrics::PipelineMetrics;
use crate::partition::{EventHandler, PartitionedPool};
use nearcast_core::bus::{EventBus, WireEvent, topics};
use nearcast_core::environment::SpatialIndex;
use nearcast_core::error::StageError;
use nearcast_core::events::{LocationEvent, ShopProximityEvent};
use nearcast_core::state::{PositionSample, UserState};
use nearcast_store::Tables;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters between two positions, by the haversine
/// formula.
#[must_use]
pub fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// First stage: consumes raw location events.
///
/// Per event: update the user's state (traveled distance, position ring
/// buffer), then look up shops within the proximity radius and fan out one
/// proximity event per shop - published on the bus for external consumers
/// and dispatched to the notification pool.
///
/// The state update always happens, even when no shops are nearby or the
/// spatial lookup fails; a lookup failure degrades to an empty shop list so
/// the ping is never lost to a flaky index.
pub struct LocationStage {
    tables: Arc<Tables>,
    spatial: Arc<dyn SpatialIndex>,
    bus: Arc<dyn EventBus>,
    next: Arc<PartitionedPool>,
    metrics: Arc<PipelineMetrics>,
    radius_m: f64,
}

impl LocationStage {
    /// Create the stage. `next` is the notification stage's pool.
    #[must_use]
    pub fn new(
        tables: Arc<Tables>,
        spatial: Arc<dyn SpatialIndex>,
        bus: Arc<dyn EventBus>,
        next: Arc<PartitionedPool>,
        metrics: Arc<PipelineMetrics>,
        radius_m: f64,
    ) -> Self {
        Self {
            tables,
            spatial,
            bus,
            next,
            metrics,
            radius_m,
        }
    }

    fn track_position(&self, event: &LocationEvent) -> UserState {
        self.tables.user_states.update(
            event.user_id,
            || UserState::seeded(event.user_id, event.latitude, event.longitude, event.timestamp),
            |state| {
                // For a freshly seeded state the prior position equals the
                // event's own, so the first step contributes zero distance.
                let step = haversine(
                    state.last_latitude,
                    state.last_longitude,
                    event.latitude,
                    event.longitude,
                );
                state.total_distance += step;
                state.last_latitude = event.latitude;
                state.last_longitude = event.longitude;
                state.last_seen = event.timestamp;
                state.push_position(PositionSample {
                    latitude: event.latitude,
                    longitude: event.longitude,
                    timestamp: event.timestamp,
                });
            },
        )
    }
}

impl EventHandler for LocationStage {
    fn stage(&self) -> &'static str {
        "location"
    }

    fn handle(
        &self,
        event: WireEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + '_>> {
        Box::pin(async move {
            let event: LocationEvent = event
                .decode()
                .map_err(|e| StageError::Malformed(e.to_string()))?;

            tracing::debug!(user_id = event.user_id, "Processing location event");

            self.track_position(&event);

            let shops = match self
                .spatial
                .find_nearby(event.latitude, event.longitude, self.radius_m)
                .await
            {
                Ok(shops) => shops,
                Err(e) => {
                    tracing::warn!(
                        user_id = event.user_id,
                        error = %e,
                        "Spatial lookup failed, continuing with no shops"
                    );
                    self.metrics.record_spatial_fallback();
                    Vec::new()
                },
            };

            for shop in shops {
                let proximity = ShopProximityEvent {
                    user_id: event.user_id,
                    shop_id: shop.shop_id,
                    shop_name: shop.shop_name,
                    shop_category: shop.category,
                    distance: shop.distance,
                    latitude: event.latitude,
                    longitude: event.longitude,
                    timestamp: event.timestamp,
                    user_age: event.age,
                    user_profession: event.profession.clone(),
                    user_interests: event.interests.clone(),
                };

                tracing::info!(
                    user_id = proximity.user_id,
                    shop = %proximity.shop_name,
                    distance_m = proximity.distance,
                    "User near shop"
                );

                let wire =
                    WireEvent::encode("ShopProximityEvent", &proximity, proximity.user_id)
                        .map_err(|e| StageError::Malformed(e.to_string()))?;

                // External consumers read the proximity topic; a publish
                // failure is logged and does not block the in-process path.
                if let Err(e) = self.bus.publish(topics::SHOP_PROXIMITY, &wire).await {
                    tracing::warn!(
                        topic = topics::SHOP_PROXIMITY,
                        error = %e,
                        "Proximity publish failed"
                    );
                }

                self.next.dispatch(wire).await?;
            }

            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code

    use super::*;
    use proptest::prelude::*;

    #[test]
    fn haversine_of_identical_points_is_zero() {
        assert!(haversine(45.4642, 9.19, 45.4642, 9.19).abs() < f64::EPSILON);
    }

    #[test]
    fn haversine_matches_known_distance() {
        // Duomo di Milano to Castello Sforzesco, roughly 1.1 km.
        let d = haversine(45.4642, 9.1900, 45.4705, 9.1794);
        assert!((1000.0..1300.0).contains(&d), "got {d}");
    }

    #[test]
    fn haversine_resolves_small_offsets() {
        // ~50m north of the reference point.
        let d = haversine(45.4642, 9.19, 45.46465, 9.19);
        assert!((40.0..60.0).contains(&d), "got {d}");
    }

    proptest! {
        #[test]
        fn haversine_is_symmetric(
            lat1 in -89.0_f64..89.0,
            lon1 in -179.0_f64..179.0,
            lat2 in -89.0_f64..89.0,
            lon2 in -179.0_f64..179.0,
        ) {
            let forward = haversine(lat1, lon1, lat2, lon2);
            let backward = haversine(lat2, lon2, lat1, lon1);
            prop_assert!((forward - backward).abs() < 1e-6);
        }

        #[test]
        fn haversine_is_non_negative_and_bounded(
            lat1 in -89.0_f64..89.0,
            lon1 in -179.0_f64..179.0,
            lat2 in -89.0_f64..89.0,
            lon2 in -179.0_f64..179.0,
        ) {
            let d = haversine(lat1, lon1, lat2, lon2);
            // Never negative, never more than half the Earth's circumference.
            prop_assert!(d >= 0.0);
            prop_assert!(d <= EARTH_RADIUS_M * std::f64::consts::PI + 1.0);
        }
    }
}
