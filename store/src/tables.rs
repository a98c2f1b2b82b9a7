//! The pipeline's table set.

use crate::table::StateTable;
use nearcast_core::state::{ShopStats, SystemStats, UserState};

/// Singleton key for the system-stats table.
const GLOBAL: &str = "global";

/// Shard counts mirror the topic partition counts of the deployment this
/// replaces: user traffic is the hot path, shop stats see less churn, and
/// system stats is a singleton.
const USER_STATE_PARTITIONS: usize = 4;
const SHOP_STATS_PARTITIONS: usize = 2;

/// The three logical tables the stages operate on.
///
/// Shared as one `Arc<Tables>` across all stages; each table enforces its
/// own shard-level locking, and the worker pools guarantee that no two
/// events for the same key are in flight at once.
#[derive(Debug)]
pub struct Tables {
    /// Per-user state, keyed by user id. Written by the location and
    /// notification stages.
    pub user_states: StateTable<i64, UserState>,
    /// Per-shop aggregates, keyed by shop id. Written by the notification
    /// stage.
    pub shop_stats: StateTable<i64, ShopStats>,
    system_stats: StateTable<&'static str, SystemStats>,
}

impl Tables {
    /// Create the table set with its standard shard layout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            user_states: StateTable::new("user_states", USER_STATE_PARTITIONS),
            shop_stats: StateTable::new("shop_stats", SHOP_STATS_PARTITIONS),
            system_stats: StateTable::new("system_stats", 1),
        }
    }

    /// Snapshot of the global aggregate.
    #[must_use]
    pub fn system_stats(&self) -> SystemStats {
        self.system_stats.get(&GLOBAL).unwrap_or_default()
    }

    /// Apply a read-modify-write to the global aggregate and return the
    /// updated snapshot.
    ///
    /// The update runs under the singleton shard's write lock; the analytics
    /// stage additionally routes all calls through a single worker, so the
    /// aggregate never loses increments.
    pub fn update_system_stats<F>(&self, apply: F) -> SystemStats
    where
        F: FnOnce(&mut SystemStats),
    {
        self.system_stats.update(GLOBAL, SystemStats::default, apply)
    }
}

impl Default for Tables {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code

    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn system_stats_starts_zeroed() {
        let tables = Tables::new();
        let stats = tables.system_stats();
        assert_eq!(stats.total_events_processed, 0);
        assert_eq!(stats.total_notifications_sent, 0);
        assert!(stats.last_updated.is_none());
    }

    #[test]
    fn system_stats_updates_accumulate() {
        let tables = Tables::new();
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        tables.update_system_stats(|s| {
            s.total_events_processed += 1;
            s.last_updated = Some(ts);
        });
        let stats = tables.update_system_stats(|s| s.total_events_processed += 1);

        assert_eq!(stats.total_events_processed, 2);
        assert_eq!(stats.last_updated, Some(ts));
    }
}
