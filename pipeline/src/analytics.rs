//! Analytics stage: durable persistence and the global aggregate.

use crate::metrics::PipelineMetrics;
use crate::partition::EventHandler;
use nearcast_core::bus::WireEvent;
use nearcast_core::environment::AnalyticsSink;
use nearcast_core::error::StageError;
use nearcast_core::events::{AnalyticsEvent, AnalyticsKind, NotificationEvent};
use nearcast_store::Tables;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Final stage: a fan-in sink with no business decisions.
///
/// Notification records go to the durable sink; analytics records fold into
/// the single global [`SystemStats`](nearcast_core::state::SystemStats)
/// aggregate. The aggregate update is a read-modify-write under the
/// singleton table's write lock, and the stage runs single-worker, so no
/// increment is ever lost.
pub struct AnalyticsStage {
    tables: Arc<Tables>,
    sink: Arc<dyn AnalyticsSink>,
    metrics: Arc<PipelineMetrics>,
}

impl AnalyticsStage {
    /// Create the stage.
    #[must_use]
    pub fn new(
        tables: Arc<Tables>,
        sink: Arc<dyn AnalyticsSink>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            tables,
            sink,
            metrics,
        }
    }

    async fn persist_notification(&self, event: &NotificationEvent) -> Result<(), StageError> {
        self.sink.store_notification(event).await.map_err(|e| {
            // The record is lost; there is no retry queue.
            self.metrics.record_sink_failure();
            StageError::transient("analytics_sink", e)
        })?;
        tracing::debug!(event_id = %event.event_id, "Notification stored");
        Ok(())
    }

    fn apply_analytics(&self, event: &AnalyticsEvent) {
        let active_users = self.tables.user_states.len() as u64;
        let stats = self.tables.update_system_stats(|stats| {
            stats.total_events_processed += 1;
            if event.event_type == AnalyticsKind::Notification {
                stats.total_notifications_sent += 1;
            }
            stats.active_users_count = active_users;
            stats.last_updated = Some(event.timestamp);
        });
        tracing::debug!(
            total_events = stats.total_events_processed,
            total_notifications = stats.total_notifications_sent,
            active_users = stats.active_users_count,
            "System stats updated"
        );
    }
}

impl EventHandler for AnalyticsStage {
    fn stage(&self) -> &'static str {
        "analytics"
    }

    fn handle(
        &self,
        event: WireEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + '_>> {
        Box::pin(async move {
            match event.event_type.as_str() {
                "NotificationEvent" => {
                    let notification: NotificationEvent = event
                        .decode()
                        .map_err(|e| StageError::Malformed(e.to_string()))?;
                    self.persist_notification(&notification).await
                },
                "AnalyticsEvent" => {
                    let analytics: AnalyticsEvent = event
                        .decode()
                        .map_err(|e| StageError::Malformed(e.to_string()))?;
                    self.apply_analytics(&analytics);
                    Ok(())
                },
                other => Err(StageError::Malformed(format!(
                    "unexpected event type '{other}' on analytics input"
                ))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code

    use super::*;
    use nearcast_testing::{CapturingSink, test_timestamp};

    fn stage(tables: Arc<Tables>) -> AnalyticsStage {
        AnalyticsStage::new(
            tables,
            Arc::new(CapturingSink::new()),
            Arc::new(PipelineMetrics::new()),
        )
    }

    fn analytics_wire(kind: AnalyticsKind) -> WireEvent {
        let event = AnalyticsEvent {
            event_type: kind,
            user_id: 1,
            shop_id: None,
            shop_category: None,
            distance: None,
            timestamp: test_timestamp(),
            metadata: serde_json::Map::new(),
        };
        WireEvent::encode("AnalyticsEvent", &event, event.user_id).unwrap()
    }

    #[tokio::test]
    async fn aggregate_counts_all_events_but_only_notification_sends() {
        let tables = Arc::new(Tables::new());
        let stage = stage(Arc::clone(&tables));

        for _ in 0..3 {
            stage
                .handle(analytics_wire(AnalyticsKind::Notification))
                .await
                .unwrap();
        }
        for kind in [AnalyticsKind::Location, AnalyticsKind::ShopVisit] {
            stage.handle(analytics_wire(kind)).await.unwrap();
        }

        let stats = tables.system_stats();
        assert_eq!(stats.total_events_processed, 5);
        assert_eq!(stats.total_notifications_sent, 3);
        assert_eq!(stats.last_updated, Some(test_timestamp()));
    }

    #[tokio::test]
    async fn unexpected_event_type_is_malformed() {
        let stage = stage(Arc::new(Tables::new()));
        let wire = WireEvent {
            event_type: "LocationEvent".into(),
            payload: b"{}".to_vec(),
            key: None,
        };
        assert!(matches!(
            stage.handle(wire).await,
            Err(StageError::Malformed(_))
        ));
    }
}
