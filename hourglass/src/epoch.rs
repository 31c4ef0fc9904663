//! Epoch normalization and rollup selection.
//!
//! Pure functions that map timestamps onto bucket epochs and decide which
//! rollup, and which of its buckets, a read or delete touches.
//!
//! # Rollup selection
//!
//! A read that names a granularity uses it directly. Otherwise the finest
//! rollup whose retention window still reaches back to the start of the range
//! is chosen. If no rollup reaches that far the coarsest one is used and the
//! oldest buckets of the result may be empty; this is best effort, not an error.
//!
//! ```rust
//! use hourglass::epoch::{bucket_epoch, select_rollup};
//! use hourglass::schedule::{Rollup, RollupSchedule};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let schedule = RollupSchedule::new(vec![Rollup::new(10, 6), Rollup::new(60, 60)])?;
//! let now = 10_000;
//!
//! assert_eq!(bucket_epoch(10_007, 10), 10_000);
//!
//! // The last 30 seconds fit in the 10s rollup's one-minute window.
//! let series = select_rollup(&schedule, now - 30, now, None, now)?;
//! assert_eq!(series.granularity(), 10);
//! assert_eq!(series.len(), 3);
//!
//! // Ten minutes back needs the 60s rollup.
//! let series = select_rollup(&schedule, now - 600, now, None, now)?;
//! assert_eq!(series.granularity(), 60);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;

use crate::error::{QueryError, Result};
use crate::query::{Span, check_range};
use crate::schedule::{Rollup, RollupSchedule};

/// Start of the bucket containing `timestamp` at `granularity`.
///
/// `floor(timestamp / granularity) * granularity`. A zero granularity leaves
/// the timestamp unchanged.
#[inline]
pub fn bucket_epoch(timestamp: u64, granularity: u64) -> u64 {
    timestamp
        .checked_rem(granularity)
        .map_or(timestamp, |offset| timestamp - offset)
}

/// Oldest bucket epoch still inside `rollup`'s retention window at `now`.
pub fn earliest_retained(rollup: &Rollup, now: u64) -> u64 {
    let newest = bucket_epoch(now, rollup.granularity);
    let span = rollup
        .granularity
        .saturating_mul(u64::from(rollup.retention.saturating_sub(1)));
    newest.saturating_sub(span)
}

/// An ascending run of bucket epochs at one granularity.
///
/// Epochs are `first, first + granularity, ...` strictly below `end`. The run
/// is stored as bounds, so wide ranges cost nothing until iterated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollupSeries {
    granularity: u64,
    first: u64,
    end: u64,
}

impl RollupSeries {
    /// Buckets at `granularity` overlapping `[start, end)`.
    pub fn covering(granularity: u64, start: u64, end: u64) -> Self {
        let first = bucket_epoch(start, granularity);
        Self {
            granularity,
            first,
            // Keep empty ranges empty even when start is mid-bucket.
            end: if start < end { end } else { first },
        }
    }

    /// The single bucket containing `timestamp`.
    pub fn instant(granularity: u64, timestamp: u64) -> Self {
        let first = bucket_epoch(timestamp, granularity);
        Self {
            granularity,
            first,
            end: first.saturating_add(granularity.max(1)),
        }
    }

    /// Every bucket retained by `rollup` at `now`.
    pub fn retained(rollup: &Rollup, now: u64) -> Self {
        let newest = bucket_epoch(now, rollup.granularity);
        Self {
            granularity: rollup.granularity,
            first: earliest_retained(rollup, now),
            end: newest.saturating_add(rollup.granularity),
        }
    }

    /// Bucket width in seconds.
    pub fn granularity(&self) -> u64 {
        self.granularity
    }

    /// Iterates the epochs in ascending order.
    pub fn epochs(&self) -> impl Iterator<Item = u64> + use<> {
        let Self {
            granularity,
            first,
            end,
        } = *self;
        std::iter::successors(Some(first), move |epoch| epoch.checked_add(granularity))
            .take_while(move |epoch| *epoch < end)
    }

    /// Whether `epoch` is one of this run's bucket epochs.
    pub fn contains(&self, epoch: u64) -> bool {
        epoch >= self.first
            && epoch < self.end
            && (epoch - self.first).checked_rem(self.granularity).unwrap_or(0) == 0
    }

    /// Number of epochs in the run.
    pub fn len(&self) -> usize {
        if self.end <= self.first || self.granularity == 0 {
            return usize::from(self.end > self.first);
        }
        let count = (self.end - self.first).div_ceil(self.granularity);
        usize::try_from(count).unwrap_or(usize::MAX)
    }

    /// Whether the run has no epochs.
    pub fn is_empty(&self) -> bool {
        self.end <= self.first
    }
}

/// Picks the rollup for a read over `[start, end)` and the epochs it visits.
///
/// # Errors
///
/// Returns [`QueryError::InvalidRange`] if `end < start`, and
/// [`QueryError::UnknownGranularity`] if `requested` is not in the schedule.
pub fn select_rollup(
    schedule: &RollupSchedule,
    start: u64,
    end: u64,
    requested: Option<u64>,
    now: u64,
) -> Result<RollupSeries> {
    check_range(start, end)?;

    let granularity = match requested {
        Some(granularity) => {
            if schedule.get(granularity).is_none() {
                return Err(QueryError::UnknownGranularity {
                    granularity,
                    available: schedule.granularities().collect(),
                }
                .into());
            }
            granularity
        }
        None => optimal_rollup(schedule, start, now).granularity,
    };

    Ok(RollupSeries::covering(granularity, start, end))
}

/// Finest rollup still retaining the bucket that contains `start`.
fn optimal_rollup(schedule: &RollupSchedule, start: u64, now: u64) -> &Rollup {
    let covering = schedule
        .rollups()
        .iter()
        .find(|rollup| bucket_epoch(start, rollup.granularity) >= earliest_retained(rollup, now));

    match covering {
        Some(rollup) => rollup,
        None => {
            let coarsest = schedule.coarsest();
            tracing::warn!(
                start,
                now,
                granularity = coarsest.granularity,
                "no rollup retains the requested range, falling back to the coarsest"
            );
            coarsest
        }
    }
}

/// Buckets a delete touches, for every granularity in the schedule.
///
/// # Errors
///
/// Returns [`QueryError::InvalidRange`] for a [`Span::Range`] whose end
/// precedes its start.
pub fn active_series(
    schedule: &RollupSchedule,
    span: &Span,
    now: u64,
) -> Result<BTreeMap<u64, RollupSeries>> {
    if let Span::Range { start, end } = *span {
        check_range(start, end)?;
    }

    Ok(schedule
        .rollups()
        .iter()
        .map(|rollup| {
            let series = match *span {
                Span::Range { start, end } => {
                    RollupSeries::covering(rollup.granularity, start, end)
                }
                Span::Instant(timestamp) => RollupSeries::instant(rollup.granularity, timestamp),
                Span::Retained => RollupSeries::retained(rollup, now),
            };
            (rollup.granularity, series)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HourglassError;
    use proptest::prelude::*;

    fn schedule() -> RollupSchedule {
        RollupSchedule::new(vec![Rollup::new(10, 6), Rollup::new(3600, 24)]).unwrap()
    }

    #[test]
    fn test_bucket_epoch() {
        assert_eq!(bucket_epoch(0, 10), 0);
        assert_eq!(bucket_epoch(9, 10), 0);
        assert_eq!(bucket_epoch(10, 10), 10);
        assert_eq!(bucket_epoch(1_700_000_123, 3600), 1_699_999_200);
        assert_eq!(bucket_epoch(42, 0), 42);
    }

    #[test]
    fn test_covering_series() {
        let series = RollupSeries::covering(10, 15, 42);
        assert_eq!(series.epochs().collect::<Vec<_>>(), vec![10, 20, 30, 40]);
        assert_eq!(series.len(), 4);
        assert!(series.contains(30));
        assert!(!series.contains(35));
        assert!(!series.contains(50));

        let empty = RollupSeries::covering(10, 15, 15);
        assert!(empty.is_empty());
        assert_eq!(empty.len(), 0);
        assert_eq!(empty.epochs().count(), 0);
    }

    #[test]
    fn test_instant_series() {
        let series = RollupSeries::instant(3600, 7205);
        assert_eq!(series.epochs().collect::<Vec<_>>(), vec![7200]);
        assert!(series.contains(7200));
        assert!(!series.contains(3600));
    }

    #[test]
    fn test_earliest_retained() {
        // 6 buckets of 10s ending at the bucket of 1005: 950..=1000
        assert_eq!(earliest_retained(&Rollup::new(10, 6), 1005), 950);
        assert_eq!(earliest_retained(&Rollup::new(10, 6), 20), 0);
        assert_eq!(
            RollupSeries::retained(&Rollup::new(10, 6), 1005).len(),
            6
        );
    }

    #[test]
    fn test_select_requested_granularity() {
        let series = select_rollup(&schedule(), 0, 7200, Some(3600), 7200).unwrap();
        assert_eq!(series.granularity(), 3600);
        assert_eq!(series.epochs().collect::<Vec<_>>(), vec![0, 3600]);
    }

    #[test]
    fn test_select_unknown_granularity() {
        let err = select_rollup(&schedule(), 0, 100, Some(60), 100).unwrap_err();
        match err {
            HourglassError::Query(QueryError::UnknownGranularity {
                granularity,
                available,
            }) => {
                assert_eq!(granularity, 60);
                assert_eq!(available, vec![10, 3600]);
            }
            other => panic!("Expected UnknownGranularity error, got: {other:?}"),
        }
    }

    #[test]
    fn test_select_optimal_rollup() {
        let now = 100_000;

        // Within the 10s rollup's minute of history
        let series = select_rollup(&schedule(), now - 50, now, None, now).unwrap();
        assert_eq!(series.granularity(), 10);

        // Beyond it, but within a day
        let series = select_rollup(&schedule(), now - 120, now, None, now).unwrap();
        assert_eq!(series.granularity(), 3600);

        // Beyond every retention window: coarsest, best effort
        let series = select_rollup(&schedule(), 0, now, None, now).unwrap();
        assert_eq!(series.granularity(), 3600);
    }

    #[test]
    fn test_select_rejects_inverted_range() {
        let err = select_rollup(&schedule(), 10, 5, None, 10).unwrap_err();
        assert!(matches!(
            err,
            HourglassError::Query(QueryError::InvalidRange { start: 10, end: 5 })
        ));
    }

    #[test]
    fn test_active_series_covers_every_granularity() {
        let schedule = schedule();

        let series = active_series(&schedule, &Span::range(3590, 3620), 5000).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(
            series[&10].epochs().collect::<Vec<_>>(),
            vec![3590, 3600, 3610]
        );
        assert_eq!(series[&3600].epochs().collect::<Vec<_>>(), vec![0, 3600]);

        let series = active_series(&schedule, &Span::Instant(3605), 5000).unwrap();
        assert_eq!(series[&10].epochs().collect::<Vec<_>>(), vec![3600]);
        assert_eq!(series[&3600].epochs().collect::<Vec<_>>(), vec![3600]);

        let series = active_series(&schedule, &Span::Retained, 100_000).unwrap();
        assert_eq!(series[&10].len(), 6);
        assert_eq!(series[&3600].len(), 24);

        assert!(active_series(&schedule, &Span::range(10, 0), 0).is_err());
    }

    proptest! {
        #[test]
        fn prop_bucket_epoch_idempotent(timestamp in any::<u64>(), granularity in 1u64..1_000_000) {
            let epoch = bucket_epoch(timestamp, granularity);
            prop_assert_eq!(bucket_epoch(epoch, granularity), epoch);
            prop_assert!(epoch <= timestamp);
            prop_assert!(timestamp - epoch < granularity);
            prop_assert_eq!(epoch % granularity, 0);
        }

        #[test]
        fn prop_bucket_epoch_monotonic(
            a in any::<u64>(),
            b in any::<u64>(),
            granularity in 1u64..1_000_000,
        ) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(bucket_epoch(lo, granularity) <= bucket_epoch(hi, granularity));
        }

        #[test]
        fn prop_covering_series_is_complete(
            start in 0u64..1_000_000,
            width in 0u64..10_000,
            granularity in 1u64..5_000,
        ) {
            let end = start + width;
            let series = RollupSeries::covering(granularity, start, end);
            let epochs: Vec<u64> = series.epochs().collect();

            prop_assert_eq!(epochs.len(), series.len());
            for window in epochs.windows(2) {
                prop_assert_eq!(window[1] - window[0], granularity);
            }
            for epoch in &epochs {
                prop_assert!(series.contains(*epoch));
                prop_assert!(*epoch < end && epoch + granularity > start);
            }
        }
    }
}
