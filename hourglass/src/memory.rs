//! In-memory reference backend.
//!
//! [`InMemoryTsdb`] implements every store trait on top of three sharded
//! [`BucketMap`]s, one per bucket family. It is the reference for the store
//! semantics and the backend used in tests and single-process tools.
//!
//! # Not for production
//!
//! Buckets are never evicted. Every coordinate ever written stays in memory
//! until it is deleted or the store is flushed, so a long-running process will
//! grow without bound. A production backend evicts each granularity's buckets
//! once they fall out of that granularity's retention window.
//!
//! # Example
//!
//! ```rust
//! use hourglass::{InMemoryTsdb, Kind, RangeQuery, RollupSchedule, SetStore, WriteTarget};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! const USERS: Kind = Kind::from_static("users-affected-by-group");
//!
//! let store = InMemoryTsdb::new(RollupSchedule::default());
//! let at = WriteTarget::at(1_700_000_000);
//! store.record(&USERS, "g1", &["u1", "u2"], &at)?;
//! store.record(&USERS, "g2", &["u2", "u3"], &at)?;
//!
//! let query = RangeQuery::new(1_700_000_000, 1_700_000_010).granularity(10);
//! assert_eq!(store.distinct_count_totals(&USERS, &["g1", "g2"], &query)?["g1"], 2);
//! assert_eq!(store.distinct_count_union(&USERS, &["g1", "g2"], &query)?, 3);
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::buckets::{BucketMap, BucketValue};
use crate::clock::{Clock, SystemClock};
use crate::config::{DEFAULT_SHARDS, TsdbConfig};
use crate::epoch::{RollupSeries, active_series, bucket_epoch, select_rollup};
use crate::error::{RecordError, Result};
use crate::frequency::FrequencyTable;
use crate::model::{EnvironmentId, Kind};
use crate::query::{FrequencyRequest, RangeQuery, Span, WriteTarget};
use crate::schedule::RollupSchedule;
use crate::store::{CounterStore, FrequencyStore, KeyedSeries, SetStore};

/// Reference backend holding every bucket in process memory.
///
/// # Thread Safety
///
/// `InMemoryTsdb` is `Send + Sync`. Each single write is applied under one
/// shard lock and is atomic with respect to other writes to the same entity.
/// Merges and deletes lock one entity at a time and are not atomic as a whole.
#[derive(Debug)]
pub struct InMemoryTsdb {
    /// Rollups every write is bucketed at.
    schedule: RollupSchedule,
    /// Supplies "now" for untimed writes and rollup selection.
    clock: Arc<dyn Clock>,
    counters: BucketMap<i64>,
    sets: BucketMap<HashSet<String>>,
    frequencies: BucketMap<FrequencyTable>,
}

impl InMemoryTsdb {
    /// Creates an empty store with the default shard count and the system clock.
    pub fn new(schedule: RollupSchedule) -> Self {
        Self::with_shards(schedule, DEFAULT_SHARDS)
    }

    /// Creates an empty store from a loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ConfigError::InvalidShardCount`] if the
    /// configuration has no shards.
    pub fn from_config(config: &TsdbConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_shards(config.rollups.clone(), config.shards))
    }

    fn with_shards(schedule: RollupSchedule, shards: usize) -> Self {
        Self {
            schedule,
            clock: Arc::new(SystemClock),
            counters: BucketMap::new(shards),
            sets: BucketMap::new(shards),
            frequencies: BucketMap::new(shards),
        }
    }

    /// Replaces the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The store's rollup schedule.
    pub fn schedule(&self) -> &RollupSchedule {
        &self.schedule
    }

    /// Drops every bucket of every family.
    pub fn flush(&self) {
        let dropped = self.counters.clear() + self.sets.clear() + self.frequencies.clear();
        tracing::debug!(dropped, "flushed in-memory store");
    }

    /// Number of live buckets across all families.
    pub fn bucket_count(&self) -> usize {
        self.counters.len() + self.sets.len() + self.frequencies.len()
    }

    /// `(granularity, epoch)` of every bucket a write at `target` lands in.
    fn slots(&self, target: &WriteTarget) -> Vec<(u64, u64)> {
        let timestamp = target.timestamp.unwrap_or_else(|| self.clock.now());
        self.schedule
            .granularities()
            .map(|granularity| (granularity, bucket_epoch(timestamp, granularity)))
            .collect()
    }

    fn series(&self, query: &RangeQuery) -> Result<RollupSeries> {
        select_rollup(
            &self.schedule,
            query.start,
            query.end,
            query.granularity,
            self.clock.now(),
        )
    }

    fn active(&self, span: &Span) -> Result<BTreeMap<u64, RollupSeries>> {
        active_series(&self.schedule, span, self.clock.now())
    }

    /// Members of `key` across every bucket of the query, collected into `into`.
    fn collect_members(
        &self,
        kind: &Kind,
        key: &str,
        query: &RangeQuery,
        series: &RollupSeries,
        into: &mut HashSet<String>,
    ) {
        self.sets
            .visit(kind, key, query.environment, series, |_, members| {
                if let Some(members) = members {
                    into.extend(members.iter().cloned());
                }
            });
    }
}

fn remove_from<V: BucketValue>(
    map: &BucketMap<V>,
    kinds: &[Kind],
    keys: &[&str],
    series: &BTreeMap<u64, RollupSeries>,
) -> usize {
    let mut removed = 0;
    for kind in kinds {
        for key in keys {
            removed += map.remove_series(kind, key, series);
        }
    }
    removed
}

fn merge_into<V: BucketValue>(
    map: &BucketMap<V>,
    kind: &Kind,
    destination: &str,
    sources: &[&str],
) -> usize {
    sources
        .iter()
        .map(|source| map.merge_entity(kind, destination, source))
        .sum()
}

impl CounterStore for InMemoryTsdb {
    fn increment(&self, kind: &Kind, key: &str, amount: i64, target: &WriteTarget) -> Result<()> {
        let slots = self.slots(target);
        tracing::trace!(%kind, key, amount, environment = ?target.environment, "increment");

        self.counters
            .update(kind, key, target.environment, &slots, |count| {
                *count = count.saturating_add(amount);
            });
        Ok(())
    }

    fn get_range(
        &self,
        kind: &Kind,
        keys: &[&str],
        query: &RangeQuery,
    ) -> Result<KeyedSeries<i64>> {
        let series = self.series(query)?;

        Ok(keys
            .iter()
            .map(|&key| {
                let mut points = Vec::with_capacity(series.len());
                self.counters
                    .visit(kind, key, query.environment, &series, |epoch, count| {
                        points.push((epoch, count.copied().unwrap_or(0)));
                    });
                (key.to_string(), points)
            })
            .collect())
    }

    fn merge(
        &self,
        kind: &Kind,
        destination: &str,
        sources: &[&str],
        environments: &[EnvironmentId],
    ) -> Result<()> {
        let moved = merge_into(&self.counters, kind, destination, sources);
        tracing::debug!(%kind, destination, ?sources, ?environments, moved, "merged counters");
        Ok(())
    }

    fn delete(&self, kinds: &[Kind], keys: &[&str], span: &Span) -> Result<()> {
        let series = self.active(span)?;
        let removed = remove_from(&self.counters, kinds, keys, &series);
        tracing::debug!(?span, removed, "deleted counters");
        Ok(())
    }
}

impl SetStore for InMemoryTsdb {
    fn record(
        &self,
        kind: &Kind,
        key: &str,
        members: &[&str],
        target: &WriteTarget,
    ) -> Result<()> {
        let slots = self.slots(target);
        tracing::trace!(%kind, key, members = members.len(), environment = ?target.environment, "record");

        self.sets.update(kind, key, target.environment, &slots, |set| {
            set.extend(members.iter().map(|member| (*member).to_string()));
        });
        Ok(())
    }

    fn distinct_count_series(
        &self,
        kind: &Kind,
        keys: &[&str],
        query: &RangeQuery,
    ) -> Result<KeyedSeries<usize>> {
        let series = self.series(query)?;

        Ok(keys
            .iter()
            .map(|&key| {
                let mut points = Vec::with_capacity(series.len());
                self.sets
                    .visit(kind, key, query.environment, &series, |epoch, members| {
                        points.push((epoch, members.map_or(0, HashSet::len)));
                    });
                (key.to_string(), points)
            })
            .collect())
    }

    fn distinct_count_totals(
        &self,
        kind: &Kind,
        keys: &[&str],
        query: &RangeQuery,
    ) -> Result<BTreeMap<String, usize>> {
        let series = self.series(query)?;

        Ok(keys
            .iter()
            .map(|&key| {
                let mut members = HashSet::new();
                self.collect_members(kind, key, query, &series, &mut members);
                (key.to_string(), members.len())
            })
            .collect())
    }

    fn distinct_count_union(
        &self,
        kind: &Kind,
        keys: &[&str],
        query: &RangeQuery,
    ) -> Result<usize> {
        let series = self.series(query)?;

        let mut members = HashSet::new();
        for key in keys {
            self.collect_members(kind, key, query, &series, &mut members);
        }
        Ok(members.len())
    }

    fn merge_distinct_counts(
        &self,
        kind: &Kind,
        destination: &str,
        sources: &[&str],
        environments: &[EnvironmentId],
    ) -> Result<()> {
        let moved = merge_into(&self.sets, kind, destination, sources);
        tracing::debug!(%kind, destination, ?sources, ?environments, moved, "merged distinct counts");
        Ok(())
    }

    fn delete_distinct_counts(&self, kinds: &[Kind], keys: &[&str], span: &Span) -> Result<()> {
        let series = self.active(span)?;
        let removed = remove_from(&self.sets, kinds, keys, &series);
        tracing::debug!(?span, removed, "deleted distinct counts");
        Ok(())
    }
}

impl FrequencyStore for InMemoryTsdb {
    fn record_many(&self, requests: &[FrequencyRequest], target: &WriteTarget) -> Result<()> {
        // Validate everything up front so a rejected batch writes nothing.
        for request in requests {
            for table in request.scores().values() {
                if let Some((member, score)) = table.iter().find(|(_, score)| !score.is_finite()) {
                    return Err(RecordError::InvalidScore {
                        member: member.to_string(),
                        score,
                    }
                    .into());
                }
            }
        }

        let slots = self.slots(target);
        for request in requests {
            for (key, scores) in request.scores() {
                tracing::trace!(kind = %request.kind(), key = key.as_str(), members = scores.len(), "record frequencies");
                self.frequencies
                    .update(request.kind(), key, target.environment, &slots, |table| {
                        table.merge(scores);
                    });
            }
        }
        Ok(())
    }

    fn most_frequent(
        &self,
        kind: &Kind,
        keys: &[&str],
        query: &RangeQuery,
        limit: Option<usize>,
    ) -> Result<BTreeMap<String, Vec<(String, f64)>>> {
        let series = self.series(query)?;

        Ok(keys
            .iter()
            .map(|&key| {
                let mut total = FrequencyTable::new();
                self.frequencies
                    .visit(kind, key, query.environment, &series, |_, scores| {
                        if let Some(scores) = scores {
                            total.merge(scores);
                        }
                    });
                (key.to_string(), total.most_common(limit))
            })
            .collect())
    }

    fn most_frequent_series(
        &self,
        kind: &Kind,
        keys: &[&str],
        query: &RangeQuery,
        limit: Option<usize>,
    ) -> Result<KeyedSeries<FrequencyTable>> {
        let series = self.series(query)?;

        Ok(keys
            .iter()
            .map(|&key| {
                let mut points = Vec::with_capacity(series.len());
                self.frequencies
                    .visit(kind, key, query.environment, &series, |epoch, scores| {
                        let top = scores.map(|scores| scores.top(limit)).unwrap_or_default();
                        points.push((epoch, top));
                    });
                (key.to_string(), points)
            })
            .collect())
    }

    fn frequency_series(
        &self,
        kind: &Kind,
        items: &[(&str, &[&str])],
        query: &RangeQuery,
    ) -> Result<KeyedSeries<FrequencyTable>> {
        let series = self.series(query)?;
        let empty = FrequencyTable::new();

        // A key listed twice reports the union of its members.
        let mut requested: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for &(key, members) in items {
            let wanted = requested.entry(key).or_default();
            for member in members {
                if !wanted.contains(member) {
                    wanted.push(*member);
                }
            }
        }

        Ok(requested
            .into_iter()
            .map(|(key, members)| {
                let mut points = Vec::with_capacity(series.len());
                self.frequencies
                    .visit(kind, key, query.environment, &series, |epoch, scores| {
                        let scores = scores.unwrap_or(&empty).select(members.as_slice());
                        points.push((epoch, scores));
                    });
                (key.to_string(), points)
            })
            .collect())
    }

    fn merge_frequencies(
        &self,
        kind: &Kind,
        destination: &str,
        sources: &[&str],
        environments: &[EnvironmentId],
    ) -> Result<()> {
        let moved = merge_into(&self.frequencies, kind, destination, sources);
        tracing::debug!(%kind, destination, ?sources, ?environments, moved, "merged frequencies");
        Ok(())
    }

    fn delete_frequencies(&self, kinds: &[Kind], keys: &[&str], span: &Span) -> Result<()> {
        let series = self.active(span)?;
        let removed = remove_from(&self.frequencies, kinds, keys, &series);
        tracing::debug!(?span, removed, "deleted frequencies");
        Ok(())
    }
}
