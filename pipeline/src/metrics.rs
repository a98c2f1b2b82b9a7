//! Pipeline outcome counters.
//!
//! Every event that enters a stage resolves to exactly one observable
//! outcome: processed, suppressed by the cooldown, or dropped with a
//! category. Counters are plain atomics (cheap to read back in tests and
//! health endpoints) and are mirrored to the `metrics` facade for the
//! Prometheus exporter.

use nearcast_core::error::ErrorCategory;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counter set for the whole pipeline.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    events_processed: AtomicU64,
    dropped_transient: AtomicU64,
    dropped_missing_state: AtomicU64,
    dropped_malformed: AtomicU64,
    spatial_fallbacks: AtomicU64,
    generator_fallbacks: AtomicU64,
    notifications_sent: AtomicU64,
    cooldown_suppressed: AtomicU64,
    cache_hits: AtomicU64,
    sink_failures: AtomicU64,
}

impl PipelineMetrics {
    /// Create a zeroed counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An event made it through a stage.
    pub fn record_processed(&self, stage: &'static str) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pipeline.events_processed", "stage" => stage).increment(1);
    }

    /// An event was dropped by a stage, with the failure category.
    pub fn record_dropped(&self, stage: &'static str, category: ErrorCategory) {
        match category {
            ErrorCategory::Transient => &self.dropped_transient,
            ErrorCategory::MissingState => &self.dropped_missing_state,
            ErrorCategory::Malformed => &self.dropped_malformed,
        }
        .fetch_add(1, Ordering::Relaxed);
        metrics::counter!(
            "pipeline.events_dropped",
            "stage" => stage,
            "category" => category.as_str()
        )
        .increment(1);
    }

    /// A spatial lookup failed and the stage continued with no shops.
    pub fn record_spatial_fallback(&self) {
        self.spatial_fallbacks.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pipeline.spatial_fallbacks").increment(1);
    }

    /// The generator failed and the local fallback text was used.
    pub fn record_generator_fallback(&self) {
        self.generator_fallbacks.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pipeline.generator_fallbacks").increment(1);
    }

    /// A notification was sent.
    pub fn record_notification_sent(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pipeline.notifications_sent").increment(1);
    }

    /// A proximity event was suppressed by the cooldown window.
    pub fn record_cooldown_suppressed(&self) {
        self.cooldown_suppressed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pipeline.cooldown_suppressed").increment(1);
    }

    /// A message was answered from the cache.
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pipeline.cache_hits").increment(1);
    }

    /// A durable sink write failed; the record is lost.
    pub fn record_sink_failure(&self) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pipeline.sink_failures").increment(1);
    }

    /// Point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_processed: self.events_processed.load(Ordering::Relaxed),
            dropped_transient: self.dropped_transient.load(Ordering::Relaxed),
            dropped_missing_state: self.dropped_missing_state.load(Ordering::Relaxed),
            dropped_malformed: self.dropped_malformed.load(Ordering::Relaxed),
            spatial_fallbacks: self.spatial_fallbacks.load(Ordering::Relaxed),
            generator_fallbacks: self.generator_fallbacks.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            cooldown_suppressed: self.cooldown_suppressed.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`PipelineMetrics`], one field per counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Events fully processed, all stages.
    pub events_processed: u64,
    /// Events dropped on a transient dependency failure.
    pub dropped_transient: u64,
    /// Events dropped for missing prerequisite state.
    pub dropped_missing_state: u64,
    /// Events dropped as undecodable.
    pub dropped_malformed: u64,
    /// Spatial lookups degraded to an empty shop list.
    pub spatial_fallbacks: u64,
    /// Messages served by the local fallback text.
    pub generator_fallbacks: u64,
    /// Notifications sent.
    pub notifications_sent: u64,
    /// Proximity events suppressed by the cooldown window.
    pub cooldown_suppressed: u64,
    /// Messages answered from the cache.
    pub cache_hits: u64,
    /// Durable sink writes that failed.
    pub sink_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_are_counted_per_category() {
        let metrics = PipelineMetrics::new();
        metrics.record_dropped("location", ErrorCategory::Malformed);
        metrics.record_dropped("notification", ErrorCategory::MissingState);
        metrics.record_dropped("notification", ErrorCategory::MissingState);
        metrics.record_dropped("analytics", ErrorCategory::Transient);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.dropped_malformed, 1);
        assert_eq!(snapshot.dropped_missing_state, 2);
        assert_eq!(snapshot.dropped_transient, 1);
        assert_eq!(snapshot.events_processed, 0);
    }
}
