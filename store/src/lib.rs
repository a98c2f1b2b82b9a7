//! # Nearcast Store
//!
//! Partitioned, keyed state tables: the mutable memory of the pipeline.
//!
//! Each logical table ([user states](Tables::user_states),
//! [shop stats](Tables::shop_stats), the
//! [system-stats singleton](Tables::system_stats)) is sharded by key hash so
//! all state for a given key lives in exactly one shard. Combined with the
//! pipeline's key-partitioned worker pools this gives per-key sequential
//! semantics without any global lock.
//!
//! Reads and writes are local and non-blocking: no I/O and no `.await` ever
//! happens while a shard guard is held.
//!
//! # Durability
//!
//! Tables are in-memory only. Cooldown history is lost on restart - an
//! explicit trade-off (the deployment this replaces ran its stream tables on
//! a memory store too). [`StateTable`] is the boundary where an embedded
//! key-value store would slot in if that trade-off changes.

pub mod table;
pub mod tables;

pub use table::StateTable;
pub use tables::Tables;
