//! Pipeline tuning and service environment configuration.

use std::time::Duration;

/// Tuning knobs for the processing pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Proximity radius for the spatial lookup, meters.
    pub proximity_radius_m: f64,
    /// Minimum event-time gap between notifications for one (user, shop)
    /// pair.
    pub notification_cooldown: Duration,
    /// Workers in the location pool.
    pub location_workers: usize,
    /// Workers in the notification pool.
    pub notification_workers: usize,
    /// Capacity of each worker's input channel.
    pub channel_buffer: usize,
    /// TTL for cached generated messages.
    pub message_cache_ttl: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            proximity_radius_m: 200.0,
            notification_cooldown: Duration::from_secs(30 * 60),
            location_workers: 4,
            notification_workers: 4,
            channel_buffer: 256,
            message_cache_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Deployment endpoints, read from the environment by the service binary.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Kafka bootstrap servers.
    pub kafka_brokers: String,
    /// Consumer group shared by pipeline instances.
    pub consumer_group: String,
    /// Postgres connection string (PostGIS shops table + analytics rows).
    pub database_url: String,
    /// Redis URL for the shared message cache; `None` falls back to the
    /// in-process cache.
    pub redis_url: Option<String>,
    /// Endpoint of the message generation service.
    pub generator_url: String,
    /// Listen address for the Prometheus exporter.
    pub metrics_addr: String,
}

impl ServiceConfig {
    /// Read the configuration from environment variables.
    ///
    /// `DATABASE_URL` is required; everything else has a local-deployment
    /// default.
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` is unset.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

        Ok(Self {
            kafka_brokers: env_or("KAFKA_BROKERS", "localhost:9092"),
            consumer_group: env_or("KAFKA_CONSUMER_GROUP", "nearcast-pipeline"),
            database_url,
            redis_url: std::env::var("REDIS_URL").ok(),
            generator_url: env_or("GENERATOR_URL", "http://localhost:8001/generate"),
            metrics_addr: env_or("METRICS_ADDR", "0.0.0.0:9090"),
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}
