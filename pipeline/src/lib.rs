//! # Nearcast Pipeline
//!
//! The stateful stream-processing core: raw GPS pings in, deduplicated,
//! rate-limited, personalized notifications and aggregate statistics out.
//!
//! ```text
//! gps_stream ──▶ LocationStage ──▶ NotificationStage ──▶ AnalyticsStage
//!                (user state,       (cooldown gate,       (durable sink,
//!                 spatial fan-out)   message resolution)    system stats)
//! ```
//!
//! Each stage is a [`PartitionedPool`] of sequential workers; events are
//! routed by user id, so per-user ordering holds end to end while unrelated
//! users proceed in parallel. Stages never call each other directly - they
//! hand events to the next stage's pool and publish copies on the bus for
//! external consumers.
//!
//! Failure policy throughout: log, count, drop the single event, keep the
//! stream moving.

pub mod analytics;
pub mod config;
pub mod location;
pub mod metrics;
pub mod notification;
pub mod partition;

pub use analytics::AnalyticsStage;
pub use config::{PipelineConfig, ServiceConfig};
pub use location::{LocationStage, haversine};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use notification::NotificationStage;
pub use partition::{EventHandler, PartitionedPool};

use futures::StreamExt;
use nearcast_core::bus::{EventBus, EventStream, WireEvent};
use nearcast_core::environment::{AnalyticsSink, SpatialIndex};
use nearcast_core::error::StageError;
use nearcast_core::state::SystemStats;
use nearcast_generator::MessageResolver;
use nearcast_store::Tables;
use std::sync::Arc;

/// The assembled three-stage pipeline.
pub struct Pipeline {
    location: Arc<PartitionedPool>,
    notification: Arc<PartitionedPool>,
    analytics: Arc<PartitionedPool>,
    tables: Arc<Tables>,
    metrics: Arc<PipelineMetrics>,
}

impl Pipeline {
    /// Wire up the stages and spawn their worker pools.
    #[must_use]
    pub fn start(
        config: &PipelineConfig,
        bus: Arc<dyn EventBus>,
        spatial: Arc<dyn SpatialIndex>,
        resolver: MessageResolver,
        sink: Arc<dyn AnalyticsSink>,
    ) -> Self {
        let tables = Arc::new(Tables::new());
        let metrics = Arc::new(PipelineMetrics::new());

        // Single worker: the system-stats aggregate is a single key and must
        // see a serialized stream of updates.
        let analytics = Arc::new(PartitionedPool::spawn(
            Arc::new(AnalyticsStage::new(
                Arc::clone(&tables),
                sink,
                Arc::clone(&metrics),
            )),
            1,
            config.channel_buffer,
            Arc::clone(&metrics),
        ));

        let notification = Arc::new(PartitionedPool::spawn(
            Arc::new(NotificationStage::new(
                Arc::clone(&tables),
                resolver,
                Arc::clone(&bus),
                Arc::clone(&analytics),
                Arc::clone(&metrics),
                config.notification_cooldown,
            )),
            config.notification_workers,
            config.channel_buffer,
            Arc::clone(&metrics),
        ));

        let location = Arc::new(PartitionedPool::spawn(
            Arc::new(LocationStage::new(
                Arc::clone(&tables),
                spatial,
                bus,
                Arc::clone(&notification),
                Arc::clone(&metrics),
                config.proximity_radius_m,
            )),
            config.location_workers,
            config.channel_buffer,
            Arc::clone(&metrics),
        ));

        Self {
            location,
            notification,
            analytics,
            tables,
            metrics,
        }
    }

    /// Feed one inbound location event into the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::Transient`] if the location pool has shut down.
    pub async fn ingest(&self, event: WireEvent) -> Result<(), StageError> {
        self.location.dispatch(event).await
    }

    /// Consume an inbound event stream until it ends.
    ///
    /// Transport errors are logged and skipped; the stream itself is never
    /// abandoned over a single bad message.
    pub async fn run(&self, mut stream: EventStream) {
        while let Some(result) = stream.next().await {
            match result {
                Ok(event) => {
                    if let Err(e) = self.ingest(event).await {
                        tracing::error!(error = %e, "Ingest failed, stopping consumption");
                        break;
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Transport error on inbound stream");
                },
            }
        }
        tracing::info!("Inbound stream ended");
    }

    /// The shared state tables.
    #[must_use]
    pub fn tables(&self) -> &Arc<Tables> {
        &self.tables
    }

    /// The shared counter set.
    #[must_use]
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Snapshot of the global aggregate statistics.
    #[must_use]
    pub fn system_stats(&self) -> SystemStats {
        self.tables.system_stats()
    }

    /// Drain the stages in flow order and wait for every worker to finish.
    ///
    /// Upstream pools are drained first so in-flight events still reach the
    /// stages behind them.
    pub async fn shutdown(self) {
        for pool in [self.location, self.notification, self.analytics] {
            match Arc::try_unwrap(pool) {
                Ok(pool) => pool.shutdown().await,
                Err(_) => {
                    tracing::warn!("Pool still referenced at shutdown, skipping drain");
                },
            }
        }
        tracing::info!("Pipeline shut down");
    }
}
