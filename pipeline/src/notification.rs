//! Notification stage: cooldown gate, message resolution, counter updates.

use crate::metrics::PipelineMetrics;
use crate::partition::{EventHandler, PartitionedPool};
use chrono::Duration as ChronoDuration;
use nearcast_core::bus::{EventBus, WireEvent, topics};
use nearcast_core::environment::{GeneratorRequest, PoiAttributes, UserAttributes};
use nearcast_core::error::StageError;
use nearcast_core::events::{AnalyticsEvent, NotificationEvent, ShopProximityEvent};
use nearcast_core::state::ShopStats;
use nearcast_generator::MessageResolver;
use nearcast_store::Tables;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Second stage: turns proximity candidates into notifications.
///
/// The cooldown window is the dedup rule: once a notification for a (user,
/// shop) pair goes out, further proximity events for that pair are suppressed
/// until the window elapses, measured in event time. Cooldown state is
/// written only after a fully successful send, so a dropped event never
/// corrupts the window - under at-least-once redelivery, a replayed
/// proximity event that already produced a notification is suppressed here.
pub struct NotificationStage {
    tables: Arc<Tables>,
    resolver: MessageResolver,
    bus: Arc<dyn EventBus>,
    next: Arc<PartitionedPool>,
    metrics: Arc<PipelineMetrics>,
    cooldown: ChronoDuration,
}

impl NotificationStage {
    /// Create the stage. `next` is the analytics stage's pool.
    ///
    /// # Panics
    ///
    /// Panics if `cooldown` exceeds the representable duration range, which
    /// no realistic configuration does.
    #[must_use]
    pub fn new(
        tables: Arc<Tables>,
        resolver: MessageResolver,
        bus: Arc<dyn EventBus>,
        next: Arc<PartitionedPool>,
        metrics: Arc<PipelineMetrics>,
        cooldown: Duration,
    ) -> Self {
        let cooldown = ChronoDuration::from_std(cooldown)
            .unwrap_or_else(|_| ChronoDuration::try_minutes(30).unwrap_or(ChronoDuration::zero()));
        Self {
            tables,
            resolver,
            bus,
            next,
            metrics,
            cooldown,
        }
    }

    fn generation_request(event: &ShopProximityEvent) -> GeneratorRequest {
        GeneratorRequest {
            user: UserAttributes {
                age: event.user_age,
                profession: event.user_profession.clone(),
                interests: event.user_interests.clone(),
            },
            poi: PoiAttributes {
                name: event.shop_name.clone(),
                category: event.shop_category.clone(),
                description: format!("Shop {:.0}m away", event.distance),
            },
        }
    }
}

impl EventHandler for NotificationStage {
    fn stage(&self) -> &'static str {
        "notification"
    }

    fn handle(
        &self,
        event: WireEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + '_>> {
        Box::pin(async move {
            let event: ShopProximityEvent = event
                .decode()
                .map_err(|e| StageError::Malformed(e.to_string()))?;

            tracing::debug!(
                user_id = event.user_id,
                shop = %event.shop_name,
                distance_m = event.distance,
                "Processing proximity event"
            );

            // A proximity event always follows a location event for the same
            // user within a run, so absent state means something upstream is
            // wrong; drop rather than guess at a profile.
            let Some(user_state) = self.tables.user_states.get(&event.user_id) else {
                return Err(StageError::MissingState {
                    user_id: event.user_id,
                });
            };

            if let Some(last) = user_state.recent_notifications.get(&event.shop_id) {
                if event.timestamp - *last < self.cooldown {
                    tracing::debug!(
                        user_id = event.user_id,
                        shop_id = event.shop_id,
                        "Notification suppressed by cooldown"
                    );
                    self.metrics.record_cooldown_suppressed();
                    return Ok(());
                }
            }

            let resolved = self
                .resolver
                .resolve(&Self::generation_request(&event))
                .await;
            if resolved.from_cache {
                self.metrics.record_cache_hit();
            }
            if resolved.used_fallback {
                self.metrics.record_generator_fallback();
            }

            // The resolver never yields an empty message, but an empty text
            // must not become a notification.
            if resolved.message.is_empty() {
                return Ok(());
            }

            let notification = NotificationEvent {
                event_id: NotificationEvent::derive_id(
                    event.user_id,
                    event.shop_id,
                    event.timestamp,
                ),
                user_id: event.user_id,
                shop_id: event.shop_id,
                shop_name: event.shop_name.clone(),
                shop_category: event.shop_category.clone(),
                message: resolved.message,
                distance: event.distance,
                latitude: event.latitude,
                longitude: event.longitude,
                timestamp: event.timestamp,
                from_cache: resolved.from_cache,
                generation_time_ms: (!resolved.from_cache).then_some(resolved.generation_time_ms),
            };

            let wire = WireEvent::encode("NotificationEvent", &notification, notification.user_id)
                .map_err(|e| StageError::Malformed(e.to_string()))?;

            self.bus
                .publish(topics::NOTIFICATIONS, &wire)
                .await
                .map_err(|e| StageError::transient("event_bus", e))?;

            // Cooldown and counters are written only now, after the publish
            // succeeded.
            self.tables.user_states.update(
                event.user_id,
                || user_state.clone(),
                |state| state.record_notification(event.shop_id, event.timestamp),
            );
            self.tables.shop_stats.update(
                event.shop_id,
                || {
                    ShopStats::new(
                        event.shop_id,
                        event.shop_name.clone(),
                        event.shop_category.clone(),
                        event.timestamp,
                    )
                },
                |stats| stats.record_notification(event.user_id, event.timestamp),
            );
            self.metrics.record_notification_sent();

            let analytics = AnalyticsEvent::for_notification(&notification);
            let analytics_wire =
                WireEvent::encode("AnalyticsEvent", &analytics, analytics.user_id)
                    .map_err(|e| StageError::Malformed(e.to_string()))?;

            if let Err(e) = self.bus.publish(topics::ANALYTICS, &analytics_wire).await {
                tracing::warn!(topic = topics::ANALYTICS, error = %e, "Analytics publish failed");
            }

            // The analytics pool consumes both the notification record (for
            // the durable sink) and its companion analytics event.
            self.next.dispatch(wire).await?;
            self.next.dispatch(analytics_wire).await?;

            tracing::info!(
                user_id = notification.user_id,
                shop = %notification.shop_name,
                from_cache = notification.from_cache,
                "Notification sent"
            );

            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code

    use super::*;
    use crate::analytics::AnalyticsStage;
    use nearcast_cache::MemoryCache;
    use nearcast_testing::{CapturingSink, InMemoryEventBus, ProximityEventBuilder, ScriptedGenerator};

    fn stage(tables: Arc<Tables>) -> (NotificationStage, Arc<PipelineMetrics>) {
        let metrics = Arc::new(PipelineMetrics::new());
        let analytics = Arc::new(PartitionedPool::spawn(
            Arc::new(AnalyticsStage::new(
                Arc::clone(&tables),
                Arc::new(CapturingSink::new()),
                Arc::clone(&metrics),
            )),
            1,
            8,
            Arc::clone(&metrics),
        ));
        let resolver = MessageResolver::new(
            Arc::new(ScriptedGenerator::new()),
            Arc::new(MemoryCache::new()),
            Duration::from_secs(60),
        );
        let stage = NotificationStage::new(
            tables,
            resolver,
            Arc::new(InMemoryEventBus::new()),
            analytics,
            Arc::clone(&metrics),
            Duration::from_secs(1800),
        );
        (stage, metrics)
    }

    #[tokio::test]
    async fn proximity_without_user_state_is_dropped() {
        let tables = Arc::new(Tables::new());
        let (stage, _metrics) = stage(tables);

        let proximity = ProximityEventBuilder::new(42).build();
        let wire = WireEvent::encode("ShopProximityEvent", &proximity, 42).unwrap();

        let err = stage.handle(wire).await.unwrap_err();
        assert!(matches!(err, StageError::MissingState { user_id: 42 }));
    }

    #[tokio::test]
    async fn undecodable_proximity_event_is_malformed() {
        let tables = Arc::new(Tables::new());
        let (stage, _metrics) = stage(tables);

        let wire = WireEvent {
            event_type: "ShopProximityEvent".into(),
            payload: b"[]".to_vec(),
            key: Some("42".into()),
        };
        assert!(matches!(
            stage.handle(wire).await,
            Err(StageError::Malformed(_))
        ));
    }
}
