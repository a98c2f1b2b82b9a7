//! Durable persistence of notification records.

use nearcast_core::environment::AnalyticsSink;
use nearcast_core::error::SinkError;
use nearcast_core::events::NotificationEvent;
use sqlx::PgPool;
use std::future::Future;
use std::pin::Pin;

/// Analytics sink writing one `user_events` row per sent notification.
///
/// Writes are append-only and fire-and-forget at the pipeline level: a
/// failed insert surfaces as [`SinkError::Write`], which the caller counts
/// and drops. Rows feed the reporting dashboard's read path.
pub struct PostgresAnalyticsSink {
    pool: PgPool,
}

impl PostgresAnalyticsSink {
    /// Create a sink over the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Numeric row key for a notification.
///
/// The string event id ends in the triggering unix timestamp; that suffix is
/// the row key. Falls back to the event's own timestamp if the id was minted
/// by a producer with a different shape.
fn numeric_event_id(event: &NotificationEvent) -> i64 {
    event
        .event_id
        .rsplit('_')
        .next()
        .and_then(|suffix| suffix.parse::<i64>().ok())
        .unwrap_or_else(|| event.timestamp.timestamp())
}

impl AnalyticsSink for PostgresAnalyticsSink {
    fn store_notification(
        &self,
        event: &NotificationEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        let event = event.clone();
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO user_events
                    (event_id, event_time, user_id, latitude, longitude,
                     poi_range, poi_name, poi_info)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ",
            )
            .bind(numeric_event_id(&event))
            .bind(event.timestamp)
            .bind(event.user_id)
            .bind(event.latitude)
            .bind(event.longitude)
            .bind(event.distance)
            .bind(&event.shop_name)
            .bind(&event.message)
            .execute(&self.pool)
            .await
            .map_err(|e| SinkError::Write(e.to_string()))?;

            tracing::debug!(
                event_id = %event.event_id,
                user_id = event.user_id,
                shop = %event.shop_name,
                "notification persisted"
            );

            metrics::counter!("analytics.rows_written").increment(1);

            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code

    use super::*;
    use chrono::{TimeZone, Utc};

    fn event(event_id: &str) -> NotificationEvent {
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        NotificationEvent {
            event_id: event_id.to_string(),
            user_id: 42,
            shop_id: 7,
            shop_name: "Café Milano".into(),
            shop_category: "bar".into(),
            message: "hello".into(),
            distance: 50.0,
            latitude: 45.4642,
            longitude: 9.19,
            timestamp: ts,
            from_cache: false,
            generation_time_ms: None,
        }
    }

    #[test]
    fn row_key_is_the_timestamp_suffix() {
        assert_eq!(numeric_event_id(&event("42_7_1717243200")), 1_717_243_200);
    }

    #[test]
    fn row_key_falls_back_to_event_time() {
        let e = event("not-a-derived-id");
        assert_eq!(numeric_event_id(&e), e.timestamp.timestamp());
    }
}
