//! # hourglass
//!
//! Rollup-based time-series aggregation engine.
//!
//! hourglass records three families of metrics, each bucketed at every
//! granularity of a configured rollup schedule:
//!
//! - **counters**: additive integers ("events seen per group")
//! - **sets**: distinct members per bucket, for cardinality queries
//!   ("users affected per group")
//! - **frequency tables**: member scores per bucket, for top-k queries
//!   ("most common releases per group")
//!
//! Every bucket is addressed by a metric [`Kind`], an entity key, an optional
//! environment, a granularity and an epoch. Writes scoped to an environment
//! also land in the aggregate environment, so the aggregate always equals the
//! combination of every environment written.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Quick Start
//!
//! ```rust
//! use hourglass::{
//!     CounterStore, FrequencyRequest, FrequencyStore, InMemoryTsdb, Kind, RangeQuery,
//!     Rollup, RollupSchedule, WriteTarget,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! const EVENTS: Kind = Kind::from_static("events-per-group");
//! const RELEASES: Kind = Kind::from_static("releases-per-group");
//!
//! // 1-minute buckets kept for an hour, 1-hour buckets kept for a day
//! let schedule = RollupSchedule::new(vec![Rollup::new(60, 60), Rollup::new(3600, 24)])?;
//! let store = InMemoryTsdb::new(schedule);
//!
//! let at = WriteTarget::at(1_700_000_000).in_environment(2);
//! store.increment(&EVENTS, "group-1", 5, &at)?;
//! store.record_many(
//!     &[FrequencyRequest::new(RELEASES).score("group-1", "1.0.0", 1.0)],
//!     &at,
//! )?;
//!
//! let query = RangeQuery::new(1_699_999_200, 1_700_006_400).granularity(3600);
//! let counts = store.get_range(&EVENTS, &["group-1"], &query)?;
//! assert_eq!(counts["group-1"], vec![(1_699_999_200, 5), (1_700_002_800, 0)]);
//!
//! let top = store.most_frequent(&RELEASES, &["group-1"], &query, Some(1))?;
//! assert_eq!(top["group-1"], vec![("1.0.0".to_string(), 1.0)]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`CounterStore`], [`SetStore`], [`FrequencyStore`] — the store contract
//! - [`InMemoryTsdb`] — reference backend implementing all three
//! - [`RollupSchedule`] — granularities and retention, finest first
//! - [`epoch`] — bucket math and rollup selection
//!
//! ## Modules
//!
//! - [`store`] — Store traits and result types
//! - [`memory`] — In-memory reference backend
//! - [`buckets`] — Sharded bucket maps behind the in-memory backend
//! - [`schedule`] — Rollup schedule configuration
//! - [`epoch`] — Epoch normalization and rollup selection
//! - [`query`] — Write targets, range queries, delete spans, frequency requests
//! - [`model`] — Kinds, environments and bucket coordinates
//! - [`frequency`] — Frequency tables and top-k ranking
//! - [`clock`] — Time sources
//! - [`config`] — JSON store configuration
//! - [`error`] — Error types

pub mod buckets;
pub mod clock;
pub mod config;
pub mod epoch;
pub mod error;
pub mod frequency;
pub mod memory;
pub mod model;
pub mod query;
pub mod schedule;
pub mod store;

// Re-export primary API types at crate root for convenience.
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::TsdbConfig;
pub use error::{HourglassError, Result};
pub use frequency::FrequencyTable;
pub use memory::InMemoryTsdb;
pub use model::{Environment, EnvironmentId, Kind};
pub use query::{FrequencyRequest, RangeQuery, Span, WriteTarget};
pub use schedule::{Rollup, RollupSchedule};
pub use store::{CounterStore, FrequencyStore, KeyedSeries, Series, SetStore, Tsdb};
