//! Nearcast pipeline service.
//!
//! Wires the production adapters (Kafka, PostGIS, Redis, the generation
//! service) into the three-stage pipeline and consumes the inbound GPS
//! stream until interrupted.

use metrics_exporter_prometheus::PrometheusBuilder;
use nearcast_cache::{MemoryCache, RedisCache};
use nearcast_core::bus::{EventBus, topics};
use nearcast_core::cache::Cache;
use nearcast_generator::{HttpMessageGenerator, MessageResolver};
use nearcast_kafka::{KafkaEventBus, wait_for_broker};
use nearcast_pipeline::{Pipeline, PipelineConfig, ServiceConfig};
use nearcast_postgres::{PostgisSpatialIndex, PostgresAnalyticsSink};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Readiness probes per startup dependency before giving up.
const STARTUP_PROBE_ATTEMPTS: usize = 30;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let service = ServiceConfig::from_env()?;
    let config = PipelineConfig::default();

    let metrics_addr: SocketAddr = service.metrics_addr.parse()?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()?;
    tracing::info!(addr = %metrics_addr, "Prometheus exporter listening");

    wait_for_broker(&service.kafka_brokers, STARTUP_PROBE_ATTEMPTS).await?;

    let pool =
        nearcast_postgres::connect_with_retry(&service.database_url, STARTUP_PROBE_ATTEMPTS)
            .await?;
    let spatial = Arc::new(PostgisSpatialIndex::new(pool.clone()));
    let sink = Arc::new(PostgresAnalyticsSink::new(pool));

    let cache: Arc<dyn Cache> = match &service.redis_url {
        Some(url) => {
            tracing::info!(url = %url, "Using Redis message cache");
            Arc::new(RedisCache::new(url)?.with_default_ttl(config.message_cache_ttl))
        },
        None => {
            tracing::info!("REDIS_URL not set, using in-process message cache");
            Arc::new(MemoryCache::new())
        },
    };

    let generator = HttpMessageGenerator::new(service.generator_url.clone())?;
    let resolver = MessageResolver::new(Arc::new(generator), cache, config.message_cache_ttl);

    let bus = Arc::new(
        KafkaEventBus::builder()
            .brokers(&service.kafka_brokers)
            .consumer_group(&service.consumer_group)
            .build()?,
    );

    let pipeline = Pipeline::start(
        &config,
        Arc::clone(&bus) as Arc<dyn EventBus>,
        spatial,
        resolver,
        sink,
    );

    let stream = bus.subscribe(&[topics::GPS_STREAM]).await?;
    tracing::info!(
        brokers = %service.kafka_brokers,
        group = %service.consumer_group,
        topic = topics::GPS_STREAM,
        "Pipeline running"
    );

    tokio::select! {
        () = pipeline.run(stream) => {
            tracing::warn!("Inbound stream closed, shutting down");
        },
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        },
    }

    pipeline.shutdown().await;
    Ok(())
}
