//! Sharded bucket storage for the in-memory backend.
//!
//! One flat ordered map per shard, keyed by the full [`BucketKey`]. A shard is
//! chosen by hashing `(kind, key)`, so every bucket of one entity (all
//! environments, granularities and epochs) lives under the same lock and
//! forms one contiguous key range inside it.
//!
//! # Locking
//!
//! - A write to one entity takes that shard's write lock once and applies all
//!   of its buckets (environment and aggregate, every granularity) under it.
//! - Reads of one entity take the shard's read lock.
//! - Operations spanning several entities (merges, unions) lock one shard at a
//!   time and never hold two locks at once.
//!
//! Buckets are never evicted; memory grows with every new coordinate written.

use std::collections::{BTreeMap, HashSet};
use std::hash::{DefaultHasher, Hash, Hasher};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::epoch::RollupSeries;
use crate::frequency::FrequencyTable;
use crate::model::{BucketKey, Environment, EnvironmentId, Kind};

/// Ordered buckets of one shard.
pub(crate) type Shard<V> = BTreeMap<BucketKey, V>;

/// A bucket payload with an identity value and a merge operation.
pub trait BucketValue: Default + Send + Sync {
    /// Folds `other` into `self`.
    fn absorb(&mut self, other: Self);
}

impl BucketValue for i64 {
    fn absorb(&mut self, other: Self) {
        *self = self.saturating_add(other);
    }
}

impl BucketValue for HashSet<String> {
    fn absorb(&mut self, other: Self) {
        self.extend(other);
    }
}

impl BucketValue for FrequencyTable {
    fn absorb(&mut self, other: Self) {
        self.merge(&other);
    }
}

/// Buckets of one value family, spread over lock-protected shards.
#[derive(Debug)]
pub struct BucketMap<V> {
    shards: Box<[RwLock<Shard<V>>]>,
}

impl<V: BucketValue> BucketMap<V> {
    /// Creates a map with `shards` shards (at least one).
    pub fn new(shards: usize) -> Self {
        Self {
            shards: (0..shards.max(1))
                .map(|_| RwLock::new(BTreeMap::new()))
                .collect(),
        }
    }

    fn shard(&self, kind: &Kind, key: &str) -> &RwLock<Shard<V>> {
        let mut hasher = DefaultHasher::new();
        kind.hash(&mut hasher);
        key.hash(&mut hasher);
        #[allow(clippy::cast_possible_truncation)] // Only the low bits pick a shard
        let hash = hasher.finish() as usize;
        &self.shards[hash % self.shards.len()]
    }

    /// Read access to the shard holding `(kind, key)`.
    pub(crate) fn read(&self, kind: &Kind, key: &str) -> RwLockReadGuard<'_, Shard<V>> {
        self.shard(kind, key).read()
    }

    /// Write access to the shard holding `(kind, key)`.
    pub(crate) fn write(&self, kind: &Kind, key: &str) -> RwLockWriteGuard<'_, Shard<V>> {
        self.shard(kind, key).write()
    }

    /// Applies `update` to the bucket at each `(granularity, epoch)` slot, in
    /// the aggregate and, if given, in `environment`. Missing buckets start at
    /// the identity value.
    pub fn update<F>(
        &self,
        kind: &Kind,
        key: &str,
        environment: Option<EnvironmentId>,
        slots: &[(u64, u64)],
        mut update: F,
    ) where
        F: FnMut(&mut V),
    {
        let mut shard = self.write(kind, key);
        for target in Environment::targets(environment) {
            for &(granularity, epoch) in slots {
                let coordinate = BucketKey::new(kind.clone(), key, target, granularity, epoch);
                update(shard.entry(coordinate).or_default());
            }
        }
    }

    /// Calls `visit` with each epoch of `series` and the bucket stored there,
    /// in ascending epoch order.
    pub fn visit<F>(
        &self,
        kind: &Kind,
        key: &str,
        environment: Environment,
        series: &RollupSeries,
        mut visit: F,
    ) where
        F: FnMut(u64, Option<&V>),
    {
        let shard = self.read(kind, key);
        let mut coordinate = BucketKey::new(kind.clone(), key, environment, series.granularity(), 0);
        for epoch in series.epochs() {
            coordinate.epoch = epoch;
            visit(epoch, shard.get(&coordinate));
        }
    }

    /// Removes and returns every bucket of `(kind, key)`.
    pub fn take_entity(&self, kind: &Kind, key: &str) -> Vec<(BucketKey, V)> {
        let (lo, hi) = BucketKey::entity_bounds(kind, key);
        let mut shard = self.write(kind, key);

        let coordinates: Vec<BucketKey> = shard.range(lo..=hi).map(|(k, _)| k.clone()).collect();
        coordinates
            .into_iter()
            .filter_map(|coordinate| shard.remove_entry(&coordinate))
            .collect()
    }

    /// Moves every bucket of `source` into the same coordinate of
    /// `destination`, combining with what is already there. Returns the number
    /// of buckets moved.
    pub fn merge_entity(&self, kind: &Kind, destination: &str, source: &str) -> usize {
        if source == destination {
            return 0;
        }

        let drained = self.take_entity(kind, source);
        let moved = drained.len();

        let mut shard = self.write(kind, destination);
        for (mut coordinate, value) in drained {
            coordinate.key = destination.to_string();
            shard.entry(coordinate).or_default().absorb(value);
        }

        moved
    }

    /// Removes the buckets of `(kind, key)` whose epoch belongs to the series
    /// for their granularity, in every environment. Returns the number removed.
    pub fn remove_series(
        &self,
        kind: &Kind,
        key: &str,
        series: &BTreeMap<u64, RollupSeries>,
    ) -> usize {
        let (lo, hi) = BucketKey::entity_bounds(kind, key);
        let mut shard = self.write(kind, key);

        let doomed: Vec<BucketKey> = shard
            .range(lo..=hi)
            .map(|(coordinate, _)| coordinate)
            .filter(|coordinate| {
                series
                    .get(&coordinate.granularity)
                    .is_some_and(|series| series.contains(coordinate.epoch))
            })
            .cloned()
            .collect();

        for coordinate in &doomed {
            shard.remove(coordinate);
        }
        doomed.len()
    }

    /// Drops every bucket. Returns the number dropped.
    pub fn clear(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                let mut shard = shard.write();
                let count = shard.len();
                shard.clear();
                count
            })
            .sum()
    }

    /// Number of live buckets across all shards.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    /// Whether no bucket exists.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.read().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KIND: Kind = Kind::from_static("events");

    fn value_at(map: &BucketMap<i64>, key: &str, environment: Environment, epoch: u64) -> i64 {
        let mut found = 0;
        map.visit(
            &KIND,
            key,
            environment,
            &RollupSeries::instant(10, epoch),
            |_, value| found = value.copied().unwrap_or(0),
        );
        found
    }

    #[test]
    fn test_update_dual_writes() {
        let map: BucketMap<i64> = BucketMap::new(4);
        map.update(&KIND, "g1", Some(5), &[(10, 100), (60, 60)], |v| *v += 3);
        map.update(&KIND, "g1", Some(6), &[(10, 100), (60, 60)], |v| *v += 4);

        // 2 granularities x (aggregate + 2 environments)
        assert_eq!(map.len(), 6);
        assert_eq!(value_at(&map, "g1", Environment::Aggregate, 100), 7);
        assert_eq!(value_at(&map, "g1", Environment::Id(5), 100), 3);
        assert_eq!(value_at(&map, "g1", Environment::Id(6), 100), 4);
    }

    #[test]
    fn test_visit_reports_missing_buckets() {
        let map: BucketMap<i64> = BucketMap::new(1);
        map.update(&KIND, "g1", None, &[(10, 20)], |v| *v += 1);

        let mut seen = Vec::new();
        map.visit(
            &KIND,
            "g1",
            Environment::Aggregate,
            &RollupSeries::covering(10, 0, 40),
            |epoch, value| seen.push((epoch, value.copied())),
        );
        assert_eq!(
            seen,
            vec![(0, None), (10, None), (20, Some(1)), (30, None)]
        );
    }

    #[test]
    fn test_take_entity_leaves_neighbours() {
        let map: BucketMap<i64> = BucketMap::new(1);
        map.update(&KIND, "g1", Some(1), &[(10, 0)], |v| *v += 1);
        map.update(&KIND, "g2", None, &[(10, 0)], |v| *v += 1);

        let taken = map.take_entity(&KIND, "g1");
        assert_eq!(taken.len(), 2);
        assert!(taken.iter().all(|(coordinate, _)| coordinate.key == "g1"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_merge_entity_combines_values() {
        let map: BucketMap<HashSet<String>> = BucketMap::new(8);
        map.update(&KIND, "dst", None, &[(10, 0)], |set| {
            set.insert("a".to_string());
        });
        map.update(&KIND, "src", None, &[(10, 0)], |set| {
            set.extend(["a".to_string(), "b".to_string()]);
        });

        assert_eq!(map.merge_entity(&KIND, "dst", "src"), 1);
        assert_eq!(map.merge_entity(&KIND, "dst", "dst"), 0);
        assert_eq!(map.len(), 1);

        let mut size = 0;
        map.visit(
            &KIND,
            "dst",
            Environment::Aggregate,
            &RollupSeries::instant(10, 0),
            |_, set| size = set.map_or(0, HashSet::len),
        );
        assert_eq!(size, 2);
    }

    #[test]
    fn test_remove_series_targets_granularity_and_epoch() {
        let map: BucketMap<i64> = BucketMap::new(2);
        map.update(&KIND, "g1", Some(9), &[(10, 0), (10, 10), (60, 0)], |v| *v += 1);

        let mut series = BTreeMap::new();
        series.insert(10, RollupSeries::instant(10, 0));

        // (10, 0) in aggregate and environment 9
        assert_eq!(map.remove_series(&KIND, "g1", &series), 2);
        assert_eq!(map.len(), 4);
        assert_eq!(value_at(&map, "g1", Environment::Aggregate, 10), 1);
    }

    #[test]
    fn test_clear() {
        let map: BucketMap<i64> = BucketMap::new(3);
        map.update(&KIND, "a", None, &[(10, 0)], |v| *v += 1);
        map.update(&KIND, "b", None, &[(10, 0)], |v| *v += 1);
        assert!(!map.is_empty());
        assert_eq!(map.clear(), 2);
        assert!(map.is_empty());
    }
}
