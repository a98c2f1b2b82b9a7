//! End-to-end pipeline tests over the in-memory fakes.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code

use chrono::Duration as ChronoDuration;
use nearcast_cache::MemoryCache;
use nearcast_core::bus::{EventBus, WireEvent, topics};
use nearcast_core::environment::{AnalyticsSink, NearbyShop, SpatialIndex};
use nearcast_core::events::{LocationEvent, NotificationEvent};
use nearcast_generator::MessageResolver;
use nearcast_pipeline::{Pipeline, PipelineConfig};
use nearcast_testing::{
    CapturingSink, InMemoryEventBus, LocationEventBuilder, ScriptedGenerator, StaticSpatialIndex,
    test_timestamp,
};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    bus: Arc<InMemoryEventBus>,
    spatial: Arc<StaticSpatialIndex>,
    generator: Arc<ScriptedGenerator>,
    sink: Arc<CapturingSink>,
    pipeline: Pipeline,
}

fn cafe_milano() -> NearbyShop {
    NearbyShop {
        shop_id: 7,
        shop_name: "Café Milano".into(),
        category: "bar".into(),
        distance: 48.0,
    }
}

fn harness(shops: Vec<NearbyShop>) -> Harness {
    let bus = Arc::new(InMemoryEventBus::new());
    let spatial = Arc::new(StaticSpatialIndex::new(shops));
    let generator = Arc::new(ScriptedGenerator::new());
    let sink = Arc::new(CapturingSink::new());

    let resolver = MessageResolver::new(
        Arc::clone(&generator) as _,
        Arc::new(MemoryCache::new()),
        Duration::from_secs(3600),
    );
    let pipeline = Pipeline::start(
        &PipelineConfig::default(),
        Arc::clone(&bus) as Arc<dyn EventBus>,
        Arc::clone(&spatial) as Arc<dyn SpatialIndex>,
        resolver,
        Arc::clone(&sink) as Arc<dyn AnalyticsSink>,
    );

    Harness {
        bus,
        spatial,
        generator,
        sink,
        pipeline,
    }
}

fn wire(event: &LocationEvent) -> WireEvent {
    WireEvent::encode("LocationEvent", event, event.user_id).unwrap()
}

#[tokio::test]
async fn ping_near_shop_produces_one_notification() {
    let h = harness(vec![cafe_milano()]);
    h.generator.push_reply("Espresso worth a detour, 48m away.");

    let event = LocationEventBuilder::new(42).build();
    h.pipeline.ingest(wire(&event)).await.unwrap();

    let tables = Arc::clone(h.pipeline.tables());
    let metrics = Arc::clone(h.pipeline.metrics());
    h.pipeline.shutdown().await;

    assert_eq!(h.bus.published_count(topics::SHOP_PROXIMITY), 1);
    assert_eq!(h.bus.published_count(topics::NOTIFICATIONS), 1);
    assert_eq!(h.bus.published_count(topics::ANALYTICS), 1);

    let stored = h.sink.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].message, "Espresso worth a detour, 48m away.");
    assert_eq!(
        stored[0].event_id,
        NotificationEvent::derive_id(42, 7, event.timestamp)
    );
    assert!(!stored[0].from_cache);

    let user = tables.user_states.get(&42).unwrap();
    assert_eq!(user.notifications_received, 1);
    assert_eq!(user.recent_notifications.get(&7), Some(&event.timestamp));

    let shop = tables.shop_stats.get(&7).unwrap();
    assert_eq!(shop.notifications_sent, 1);
    assert_eq!(shop.unique_visitors, 1);

    let stats = tables.system_stats();
    assert_eq!(stats.total_events_processed, 1);
    assert_eq!(stats.total_notifications_sent, 1);
    assert_eq!(stats.active_users_count, 1);
    assert_eq!(stats.last_updated, Some(event.timestamp));

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.notifications_sent, 1);
    assert_eq!(snapshot.cooldown_suppressed, 0);
    assert_eq!(snapshot.generator_fallbacks, 0);
}

#[tokio::test]
async fn cooldown_suppresses_within_window_and_releases_after() {
    let h = harness(vec![cafe_milano()]);
    h.generator.push_reply("First visit message.");

    let t0 = test_timestamp();
    for offset in [
        ChronoDuration::zero(),
        // 29:59 into the window: suppressed.
        ChronoDuration::seconds(29 * 60 + 59),
        // 30:01 after the *first* notification: sends again.
        ChronoDuration::seconds(30 * 60 + 1),
    ] {
        let event = LocationEventBuilder::new(42).timestamp(t0 + offset).build();
        h.pipeline.ingest(wire(&event)).await.unwrap();
    }

    let metrics = Arc::clone(h.pipeline.metrics());
    h.pipeline.shutdown().await;

    assert_eq!(h.bus.published_count(topics::SHOP_PROXIMITY), 3);
    assert_eq!(h.bus.published_count(topics::NOTIFICATIONS), 2);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.notifications_sent, 2);
    assert_eq!(snapshot.cooldown_suppressed, 1);

    // The second send was answered from the cache; the generator was only
    // called once.
    assert_eq!(h.generator.calls(), 1);
    assert_eq!(snapshot.cache_hits, 1);
    let stored = h.sink.stored();
    assert_eq!(stored.len(), 2);
    assert!(!stored[0].from_cache);
    assert!(stored[1].from_cache);
}

#[tokio::test]
async fn spatial_failure_degrades_to_no_shops_but_tracks_position() {
    let h = harness(vec![cafe_milano()]);
    h.spatial.set_failing(true);

    let event = LocationEventBuilder::new(42).build();
    h.pipeline.ingest(wire(&event)).await.unwrap();

    let tables = Arc::clone(h.pipeline.tables());
    let metrics = Arc::clone(h.pipeline.metrics());
    h.pipeline.shutdown().await;

    assert_eq!(h.bus.published_count(topics::SHOP_PROXIMITY), 0);
    assert_eq!(metrics.snapshot().spatial_fallbacks, 1);

    // The state mutation happens regardless of the lookup outcome.
    let user = tables.user_states.get(&42).unwrap();
    assert_eq!(user.recent_positions.len(), 1);
    assert_eq!(user.last_seen, event.timestamp);
}

#[tokio::test]
async fn generator_outage_falls_back_and_still_notifies() {
    let h = harness(vec![cafe_milano()]);
    // Empty script: every generation call fails.

    let event = LocationEventBuilder::new(42).build();
    h.pipeline.ingest(wire(&event)).await.unwrap();

    let metrics = Arc::clone(h.pipeline.metrics());
    h.pipeline.shutdown().await;

    let stored = h.sink.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(
        stored[0].message,
        "You are near Café Milano! Stop by and take a look."
    );
    assert_eq!(metrics.snapshot().generator_fallbacks, 1);
    assert_eq!(metrics.snapshot().notifications_sent, 1);
}

#[tokio::test]
async fn traveled_distance_accumulates_across_pings() {
    let h = harness(Vec::new());

    let t0 = test_timestamp();
    // Two steps of ~50m each, due north.
    let positions = [(45.4642, 9.19), (45.46465, 9.19), (45.4651, 9.19)];
    for (i, (lat, lon)) in positions.iter().enumerate() {
        let event = LocationEventBuilder::new(42)
            .position(*lat, *lon)
            .timestamp(t0 + ChronoDuration::seconds(i64::try_from(i).unwrap() * 10))
            .build();
        h.pipeline.ingest(wire(&event)).await.unwrap();
    }

    let tables = Arc::clone(h.pipeline.tables());
    h.pipeline.shutdown().await;

    let user = tables.user_states.get(&42).unwrap();
    assert_eq!(user.recent_positions.len(), 3);
    assert!(
        (80.0..120.0).contains(&user.total_distance),
        "total_distance = {}",
        user.total_distance
    );
}

#[tokio::test]
async fn sink_failure_is_counted_and_stats_still_update() {
    let h = harness(vec![cafe_milano()]);
    h.generator.push_reply("Come in!");
    h.sink.set_failing(true);

    let event = LocationEventBuilder::new(42).build();
    h.pipeline.ingest(wire(&event)).await.unwrap();

    let tables = Arc::clone(h.pipeline.tables());
    let metrics = Arc::clone(h.pipeline.metrics());
    h.pipeline.shutdown().await;

    assert!(h.sink.stored().is_empty());
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.sink_failures, 1);
    assert_eq!(snapshot.dropped_transient, 1);

    // The companion analytics record is independent of the sink write.
    let stats = tables.system_stats();
    assert_eq!(stats.total_notifications_sent, 1);
}

#[tokio::test]
async fn multiple_users_update_active_user_count() {
    let h = harness(Vec::new());

    for user_id in 1..=5 {
        let event = LocationEventBuilder::new(user_id).build();
        h.pipeline.ingest(wire(&event)).await.unwrap();
    }

    let tables = Arc::clone(h.pipeline.tables());
    h.pipeline.shutdown().await;

    assert_eq!(tables.user_states.len(), 5);
    // No analytics events flowed (no shops), so the aggregate is untouched.
    assert_eq!(tables.system_stats().total_events_processed, 0);
}

#[tokio::test]
async fn malformed_inbound_event_is_dropped_not_fatal() {
    let h = harness(vec![cafe_milano()]);
    h.generator.push_reply("Still alive.");

    h.pipeline
        .ingest(WireEvent {
            event_type: "LocationEvent".into(),
            payload: b"not json".to_vec(),
            key: Some("42".into()),
        })
        .await
        .unwrap();
    let event = LocationEventBuilder::new(42).build();
    h.pipeline.ingest(wire(&event)).await.unwrap();

    let metrics = Arc::clone(h.pipeline.metrics());
    h.pipeline.shutdown().await;

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.dropped_malformed, 1);
    assert_eq!(snapshot.notifications_sent, 1);
}
