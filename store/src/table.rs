//! Hash-partitioned key/value table.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{PoisonError, RwLock};

/// A keyed table split into a fixed number of shards.
///
/// `get`/`put`/`update` address exactly one shard, chosen by key hash, so
/// contention is bounded by the shard count and unrelated keys never block
/// each other. Values are cloned out on read; each key holds exactly one
/// current value, replaced atomically on update.
#[derive(Debug)]
pub struct StateTable<K, V> {
    name: &'static str,
    shards: Vec<RwLock<HashMap<K, V>>>,
}

impl<K, V> StateTable<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a table with `partitions` shards.
    ///
    /// # Panics
    ///
    /// Panics if `partitions` is 0.
    #[must_use]
    pub fn new(name: &'static str, partitions: usize) -> Self {
        assert!(partitions > 0, "partitions must be greater than 0");
        let shards = (0..partitions).map(|_| RwLock::new(HashMap::new())).collect();
        Self { name, shards }
    }

    /// Table name, used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Number of shards.
    #[must_use]
    pub fn partitions(&self) -> usize {
        self.shards.len()
    }

    fn shard(&self, key: &K) -> &RwLock<HashMap<K, V>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        &self.shards[index]
    }

    /// Look up the current value for a key.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        let guard = self
            .shard(key)
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        guard.get(key).cloned()
    }

    /// Replace the value for a key.
    pub fn put(&self, key: K, value: V) {
        let mut guard = self
            .shard(&key)
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.insert(key, value);
    }

    /// Read-modify-write under a single write guard.
    ///
    /// Inserts `default()` if the key is absent, applies `apply` to the
    /// stored value in place, and returns a clone of the result. This is the
    /// primitive behind per-key counters (and the system-stats singleton):
    /// no concurrent increment can be lost because the whole cycle holds the
    /// shard's write lock.
    pub fn update<D, F>(&self, key: K, default: D, apply: F) -> V
    where
        D: FnOnce() -> V,
        F: FnOnce(&mut V),
    {
        let mut guard = self
            .shard(&key)
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let value = guard.entry(key).or_insert_with(default);
        apply(value);
        value.clone()
    }

    /// Whether a value exists for the key.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        let guard = self
            .shard(key)
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        guard.contains_key(key)
    }

    /// Total number of keys across all shards.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    /// Whether the table holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code

    use super::*;
    use std::sync::Arc;

    #[test]
    fn put_then_get_round_trips() {
        let table: StateTable<i64, String> = StateTable::new("test", 4);
        table.put(1, "a".into());
        table.put(2, "b".into());

        assert_eq!(table.get(&1).as_deref(), Some("a"));
        assert_eq!(table.get(&2).as_deref(), Some("b"));
        assert_eq!(table.get(&3), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn update_inserts_default_then_mutates() {
        let table: StateTable<i64, u64> = StateTable::new("counters", 2);

        let first = table.update(7, || 0, |v| *v += 1);
        let second = table.update(7, || 0, |v| *v += 1);

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(table.get(&7), Some(2));
    }

    #[test]
    fn concurrent_updates_lose_no_increments() {
        let table: Arc<StateTable<&'static str, u64>> = Arc::new(StateTable::new("global", 1));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let table = Arc::clone(&table);
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    table.update("total", || 0, |v| *v += 1);
                }
            }));
        }
        for handle in handles {
            handle.join().expect("worker thread panicked");
        }

        assert_eq!(table.get(&"total"), Some(8000));
    }

    #[test]
    #[should_panic(expected = "partitions must be greater than 0")]
    fn zero_partitions_is_rejected() {
        let _ = StateTable::<i64, u64>::new("bad", 0);
    }
}
