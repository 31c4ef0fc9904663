//! Error types for the hourglass aggregation engine.

use thiserror::Error;

/// The main error type for all hourglass operations.
///
/// Reads of coordinates that were never written are not errors; they yield the
/// identity value of the bucket family (0, an empty set, an empty table).
#[derive(Error, Debug)]
pub enum HourglassError {
    /// The rollup schedule is invalid.
    #[error("schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// A read or delete request violated the caller contract.
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// A write carried an unacceptable value.
    #[error("record error: {0}")]
    Record(#[from] RecordError),

    /// Store configuration could not be loaded.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The storage backend failed to serve the request.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Errors raised while validating a rollup schedule.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// No rollups are configured.
    #[error("at least one rollup must be configured")]
    NoRollups,

    /// A rollup has a zero-second granularity.
    #[error("rollup granularity cannot be zero")]
    ZeroGranularity,

    /// A rollup retains no buckets.
    #[error("rollup with granularity {granularity}s must retain at least one bucket")]
    ZeroRetention {
        /// The offending granularity in seconds.
        granularity: u64,
    },

    /// Two rollups share the same granularity.
    #[error("granularity {granularity}s appears more than once in the schedule")]
    DuplicateGranularity {
        /// The repeated granularity in seconds.
        granularity: u64,
    },
}

/// Errors raised on the read and delete paths.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The time range ends before it starts.
    #[error("invalid time range: end {end} < start {start}")]
    InvalidRange {
        /// The start of the requested range.
        start: u64,
        /// The end of the requested range.
        end: u64,
    },

    /// The requested granularity is not part of the schedule.
    #[error("granularity {granularity}s is not configured (available: {available:?})")]
    UnknownGranularity {
        /// The requested granularity in seconds.
        granularity: u64,
        /// The granularities the schedule does hold.
        available: Vec<u64>,
    },
}

/// Errors raised on the write path.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    /// A frequency score is NaN or infinite.
    #[error("invalid score {score} for member '{member}'")]
    InvalidScore {
        /// The member the score was recorded for.
        member: String,
        /// The rejected score.
        score: f64,
    },
}

/// Errors raised while loading a store configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config from '{path}': {source}")]
    Load {
        /// The config file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration document is not valid JSON or fails validation.
    #[error("failed to parse config from '{path}': {source}")]
    Parse {
        /// Where the document came from.
        path: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The shard count is zero.
    #[error("invalid shard count: {count} (must be > 0)")]
    InvalidShardCount {
        /// The rejected count.
        count: usize,
    },
}

/// Errors surfaced by a storage backend.
///
/// The store contract does not retry; retry and backoff belong to the backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend could not be reached.
    #[error("backend '{backend}' is unavailable: {reason}")]
    Unavailable {
        /// Name of the backend that failed.
        backend: String,
        /// Why the backend is unavailable.
        reason: String,
    },
}

/// Type alias for `Result<T, HourglassError>`.
pub type Result<T> = std::result::Result<T, HourglassError>;
