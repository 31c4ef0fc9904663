//! The store contract.
//!
//! Three traits cover the three bucket families. Callers program against
//! these traits, never against a backend's internals, so the in-memory
//! reference backend and a durable networked backend are interchangeable.
//!
//! # Consistency
//!
//! A backend must apply each single write (`increment`, `record`, one
//! `record_many` entry) indivisibly: concurrent writers to the same bucket
//! never lose updates, and the aggregate bucket moves together with the
//! environment bucket. `merge` and `delete` span many buckets and are best
//! effort: a write that races with a merge of the same keys may be lost.
//! Callers that need exact results serialize those operations themselves.
//!
//! # Example
//!
//! ```rust
//! use hourglass::{CounterStore, InMemoryTsdb, Kind, RangeQuery, RollupSchedule, WriteTarget};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! const EVENTS: Kind = Kind::from_static("events-per-group");
//!
//! fn record_event(store: &dyn CounterStore, group: &str, ts: u64) -> hourglass::Result<()> {
//!     store.increment(&EVENTS, group, 1, &WriteTarget::at(ts))
//! }
//!
//! let store = InMemoryTsdb::new(RollupSchedule::default());
//! record_event(&store, "group-1", 1_700_000_005)?;
//! record_event(&store, "group-1", 1_700_000_007)?;
//!
//! let query = RangeQuery::new(1_700_000_000, 1_700_000_010).granularity(10);
//! let sums = store.get_sums(&EVENTS, &["group-1"], &query)?;
//! assert_eq!(sums["group-1"], 2);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;

use crate::error::Result;
use crate::frequency::FrequencyTable;
use crate::model::{EnvironmentId, Kind};
use crate::query::{FrequencyRequest, RangeQuery, Span, WriteTarget};

/// Ascending `(epoch, value)` pairs.
pub type Series<T> = Vec<(u64, T)>;

/// A [`Series`] per entity key.
pub type KeyedSeries<T> = BTreeMap<String, Series<T>>;

/// Additive integer counters.
pub trait CounterStore: Send + Sync {
    /// Adds `amount` to the bucket containing the target time, at every
    /// granularity, for the target environment and the aggregate.
    ///
    /// A zero amount still creates the buckets. Negative amounts reduce the
    /// stored totals.
    ///
    /// # Errors
    ///
    /// Returns an error only when the backend cannot serve the write.
    fn increment(&self, kind: &Kind, key: &str, amount: i64, target: &WriteTarget) -> Result<()>;

    /// One `(epoch, count)` pair per key per bucket in the range, zero where
    /// nothing was written.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::QueryError`] for an inverted range or an
    /// unknown granularity.
    fn get_range(
        &self,
        kind: &Kind,
        keys: &[&str],
        query: &RangeQuery,
    ) -> Result<KeyedSeries<i64>>;

    /// Per-key total over the range.
    ///
    /// # Errors
    ///
    /// Same as [`CounterStore::get_range`].
    fn get_sums(
        &self,
        kind: &Kind,
        keys: &[&str],
        query: &RangeQuery,
    ) -> Result<BTreeMap<String, i64>> {
        Ok(self
            .get_range(kind, keys, query)?
            .into_iter()
            .map(|(key, series)| {
                let total = series
                    .iter()
                    .fold(0i64, |total, (_, count)| total.saturating_add(*count));
                (key, total)
            })
            .collect())
    }

    /// Adds every bucket of `sources` into `destination` and removes the
    /// sources. A source equal to the destination is skipped.
    ///
    /// `environments` names the concrete environments the caller needs
    /// carried over; the aggregate always is. A backend may carry more: the
    /// in-memory backend moves every environment the sources hold.
    ///
    /// # Errors
    ///
    /// Returns an error only when the backend cannot serve the merge.
    fn merge(
        &self,
        kind: &Kind,
        destination: &str,
        sources: &[&str],
        environments: &[EnvironmentId],
    ) -> Result<()>;

    /// Clears the buckets `span` selects, at every granularity, for every
    /// kind and key given, in the aggregate and every environment.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::QueryError::InvalidRange`] for an inverted span.
    fn delete(&self, kinds: &[Kind], keys: &[&str], span: &Span) -> Result<()>;
}

/// Per-bucket member sets for distinct counting.
pub trait SetStore: Send + Sync {
    /// Unions `members` into the target buckets at every granularity.
    ///
    /// # Errors
    ///
    /// Returns an error only when the backend cannot serve the write.
    fn record(&self, kind: &Kind, key: &str, members: &[&str], target: &WriteTarget)
    -> Result<()>;

    /// Cardinality of each bucket in the range, per key.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::QueryError`] for an inverted range or an
    /// unknown granularity.
    fn distinct_count_series(
        &self,
        kind: &Kind,
        keys: &[&str],
        query: &RangeQuery,
    ) -> Result<KeyedSeries<usize>>;

    /// Distinct members over the whole range, per key. Members seen in several
    /// buckets count once.
    ///
    /// # Errors
    ///
    /// Same as [`SetStore::distinct_count_series`].
    fn distinct_count_totals(
        &self,
        kind: &Kind,
        keys: &[&str],
        query: &RangeQuery,
    ) -> Result<BTreeMap<String, usize>>;

    /// Distinct members over the whole range across all `keys` together.
    ///
    /// # Errors
    ///
    /// Same as [`SetStore::distinct_count_series`].
    fn distinct_count_union(&self, kind: &Kind, keys: &[&str], query: &RangeQuery)
    -> Result<usize>;

    /// Unions every bucket of `sources` into `destination` and removes the
    /// sources. `environments` is treated as in [`CounterStore::merge`].
    ///
    /// # Errors
    ///
    /// Returns an error only when the backend cannot serve the merge.
    fn merge_distinct_counts(
        &self,
        kind: &Kind,
        destination: &str,
        sources: &[&str],
        environments: &[EnvironmentId],
    ) -> Result<()>;

    /// Clears the set buckets `span` selects.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::QueryError::InvalidRange`] for an inverted span.
    fn delete_distinct_counts(&self, kinds: &[Kind], keys: &[&str], span: &Span) -> Result<()>;
}

/// Per-bucket weighted member tables for top-k queries.
pub trait FrequencyStore: Send + Sync {
    /// Adds each request's member scores into the target buckets at every
    /// granularity.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::RecordError::InvalidScore`] if any score is
    /// NaN or infinite; nothing is written in that case.
    fn record_many(&self, requests: &[FrequencyRequest], target: &WriteTarget) -> Result<()>;

    /// Highest-scoring members over the whole range, per key, ranked by
    /// descending score then ascending member.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::QueryError`] for an inverted range or an
    /// unknown granularity.
    fn most_frequent(
        &self,
        kind: &Kind,
        keys: &[&str],
        query: &RangeQuery,
        limit: Option<usize>,
    ) -> Result<BTreeMap<String, Vec<(String, f64)>>>;

    /// The top `limit` members of each individual bucket, per key.
    ///
    /// # Errors
    ///
    /// Same as [`FrequencyStore::most_frequent`].
    fn most_frequent_series(
        &self,
        kind: &Kind,
        keys: &[&str],
        query: &RangeQuery,
        limit: Option<usize>,
    ) -> Result<KeyedSeries<FrequencyTable>>;

    /// Scores of the requested members in each bucket. `items` pairs each
    /// key with its members; members never recorded report `0.0`.
    ///
    /// # Errors
    ///
    /// Same as [`FrequencyStore::most_frequent`].
    fn frequency_series(
        &self,
        kind: &Kind,
        items: &[(&str, &[&str])],
        query: &RangeQuery,
    ) -> Result<KeyedSeries<FrequencyTable>>;

    /// Scores of the requested members summed over the range. A key listed
    /// more than once is summed once, over the union of its members.
    ///
    /// # Errors
    ///
    /// Same as [`FrequencyStore::most_frequent`].
    fn frequency_totals(
        &self,
        kind: &Kind,
        items: &[(&str, &[&str])],
        query: &RangeQuery,
    ) -> Result<BTreeMap<String, FrequencyTable>> {
        let series = self.frequency_series(kind, items, query)?;

        let mut totals: BTreeMap<String, FrequencyTable> = BTreeMap::new();
        for &(key, members) in items {
            let total = totals.entry(key.to_string()).or_insert_with(|| {
                let mut total = FrequencyTable::new();
                for (_, scores) in series.get(key).into_iter().flatten() {
                    total.merge(scores);
                }
                total
            });
            for member in members {
                if !total.contains(member) {
                    total.insert(*member, 0.0);
                }
            }
        }
        Ok(totals)
    }

    /// Sums every bucket of `sources` into `destination` and removes the
    /// sources. `environments` is treated as in [`CounterStore::merge`].
    ///
    /// # Errors
    ///
    /// Returns an error only when the backend cannot serve the merge.
    fn merge_frequencies(
        &self,
        kind: &Kind,
        destination: &str,
        sources: &[&str],
        environments: &[EnvironmentId],
    ) -> Result<()>;

    /// Clears the frequency buckets `span` selects.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::QueryError::InvalidRange`] for an inverted span.
    fn delete_frequencies(&self, kinds: &[Kind], keys: &[&str], span: &Span) -> Result<()>;
}

/// A backend serving all three bucket families.
pub trait Tsdb: CounterStore + SetStore + FrequencyStore {}

impl<T: CounterStore + SetStore + FrequencyStore + ?Sized> Tsdb for T {}
