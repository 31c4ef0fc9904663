//! Request types shared by every store: where a write lands, which range a
//! read covers, and which buckets a delete clears.

use std::collections::BTreeMap;

use crate::error::{QueryError, Result};
use crate::frequency::FrequencyTable;
use crate::model::{Environment, EnvironmentId, Kind};

/// Time and environment a write is recorded at.
///
/// Without a timestamp the store's clock supplies "now". A write scoped to an
/// environment lands in that environment's buckets and in the aggregate.
///
/// ```rust
/// use hourglass::WriteTarget;
///
/// let target = WriteTarget::at(1_700_000_000).in_environment(3);
/// assert_eq!(target.timestamp, Some(1_700_000_000));
/// assert_eq!(target.environment, Some(3));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteTarget {
    /// Unix seconds of the observation, or `None` for now.
    pub timestamp: Option<u64>,
    /// Concrete environment of the observation, if any.
    pub environment: Option<EnvironmentId>,
}

impl WriteTarget {
    /// A write at the store clock's current time, aggregate only.
    pub fn now() -> Self {
        Self::default()
    }

    /// A write at `timestamp`, aggregate only.
    pub fn at(timestamp: u64) -> Self {
        Self {
            timestamp: Some(timestamp),
            environment: None,
        }
    }

    /// Scopes the write to `environment` (in addition to the aggregate).
    pub fn in_environment(mut self, environment: EnvironmentId) -> Self {
        self.environment = Some(environment);
        self
    }
}

/// A read over the half-open interval `[start, end)`.
///
/// Without an explicit granularity the store picks the finest rollup whose
/// retention covers the range. Reads default to the aggregate environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeQuery {
    /// Inclusive start in Unix seconds.
    pub start: u64,
    /// Exclusive end in Unix seconds.
    pub end: u64,
    /// Granularity to read at, or `None` for automatic selection.
    pub granularity: Option<u64>,
    /// Environment to read.
    pub environment: Environment,
}

impl RangeQuery {
    /// Creates an aggregate-environment query over `[start, end)`.
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end,
            granularity: None,
            environment: Environment::Aggregate,
        }
    }

    /// Reads at exactly this granularity.
    pub fn granularity(mut self, granularity: u64) -> Self {
        self.granularity = Some(granularity);
        self
    }

    /// Reads a single concrete environment.
    pub fn environment(mut self, environment: EnvironmentId) -> Self {
        self.environment = Environment::Id(environment);
        self
    }

    /// Checks that the range does not end before it starts.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidRange`] if `end < start`.
    pub fn validate(&self) -> Result<()> {
        check_range(self.start, self.end)
    }
}

/// Buckets targeted by a delete, evaluated once per granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Span {
    /// Every bucket overlapping `[start, end)`.
    Range {
        /// Inclusive start in Unix seconds.
        start: u64,
        /// Exclusive end in Unix seconds.
        end: u64,
    },

    /// The single bucket containing this instant.
    Instant(u64),

    /// Every bucket still inside the granularity's retention window.
    Retained,
}

impl Span {
    /// Shorthand for [`Span::Range`].
    pub fn range(start: u64, end: u64) -> Self {
        Self::Range { start, end }
    }
}

/// One frequency write: member scores per entity key, all under one kind.
///
/// ```rust
/// use hourglass::{FrequencyRequest, Kind};
///
/// let request = FrequencyRequest::new(Kind::from_static("releases-per-group"))
///     .score("group-1", "1.0.0", 2.0)
///     .score("group-1", "1.0.1", 1.0)
///     .score("group-2", "1.0.0", 5.0);
/// assert_eq!(request.scores().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyRequest {
    kind: Kind,
    scores: BTreeMap<String, FrequencyTable>,
}

impl FrequencyRequest {
    /// Creates an empty request for `kind`.
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            scores: BTreeMap::new(),
        }
    }

    /// Adds `score` for `member` under `key`.
    pub fn score(mut self, key: impl Into<String>, member: impl Into<String>, score: f64) -> Self {
        self.scores.entry(key.into()).or_default().add(member, score);
        self
    }

    /// Adds a whole table of scores under `key`.
    pub fn table(mut self, key: impl Into<String>, table: &FrequencyTable) -> Self {
        self.scores.entry(key.into()).or_default().merge(table);
        self
    }

    /// The kind every score is recorded under.
    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    /// Member scores per entity key.
    pub fn scores(&self) -> &BTreeMap<String, FrequencyTable> {
        &self.scores
    }
}

pub(crate) fn check_range(start: u64, end: u64) -> Result<()> {
    if end < start {
        return Err(QueryError::InvalidRange { start, end }.into());
    }
    Ok(())
}
