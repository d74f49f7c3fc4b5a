//! Lock-sharded hash map.
//!
//! Both stores keep their buckets here so a write to one key only blocks
//! readers that hash to the same shard.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{PoisonError, RwLock};

pub(crate) const DEFAULT_SHARDS: usize = 16;

#[derive(Debug)]
pub(crate) struct ShardedMap<K, V> {
    shards: Vec<RwLock<HashMap<K, V>>>,
}

impl<K: Eq + Hash, V> ShardedMap<K, V> {
    pub(crate) fn new(shard_count: usize) -> Self {
        let count = shard_count.max(1);
        Self {
            shards: (0..count).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, key: &K) -> &RwLock<HashMap<K, V>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }

    /// Run `f` against the value stored at `key` under a read lock.
    pub(crate) fn read<R>(&self, key: &K, f: impl FnOnce(Option<&V>) -> R) -> R {
        let guard = self
            .shard(key)
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(guard.get(key))
    }

    /// Run `f` against the value at `key`, inserting `V::default()` first if
    /// the key is absent. Entries left empty by `f` are removed when
    /// `is_empty` says so.
    pub(crate) fn write<R>(
        &self,
        key: K,
        is_empty: impl Fn(&V) -> bool,
        f: impl FnOnce(&mut V) -> R,
    ) -> R
    where
        K: Clone,
        V: Default,
    {
        let mut guard = self
            .shard(&key)
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let value = guard.entry(key.clone()).or_default();
        let result = f(value);
        if is_empty(value) {
            guard.remove(&key);
        }
        result
    }

    /// Visit every entry, one shard at a time.
    pub(crate) fn for_each(&self, mut f: impl FnMut(&K, &V)) {
        for shard in &self.shards {
            let guard = shard.read().unwrap_or_else(PoisonError::into_inner);
            for (k, v) in guard.iter() {
                f(k, v);
            }
        }
    }

    /// Number of keys across all shards.
    pub(crate) fn key_count(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub(crate) fn clear(&self) {
        for shard in &self.shards {
            shard
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_and_cleanup() {
        let map: ShardedMap<u32, Vec<u32>> = ShardedMap::new(4);

        map.write(1, Vec::is_empty, |v| v.push(10));
        map.write(1, Vec::is_empty, |v| v.push(11));
        map.write(2, Vec::is_empty, |v| v.push(20));

        assert_eq!(map.read(&1, |v| v.map(|v| v.len())), Some(2));
        assert_eq!(map.key_count(), 2);

        // Emptying a bucket drops the key
        map.write(2, Vec::is_empty, |v| v.clear());
        assert_eq!(map.read(&2, |v| v.is_some()), false);
        assert_eq!(map.key_count(), 1);

        let mut total = 0;
        map.for_each(|_, v| total += v.len());
        assert_eq!(total, 2);

        map.clear();
        assert_eq!(map.key_count(), 0);
    }
}
