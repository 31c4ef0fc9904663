//! Rollup schedule configuration.
//!
//! A schedule is the ordered set of time granularities every metric is
//! bucketed at, each paired with the number of buckets a production backend
//! keeps before evicting. The schedule is fixed for the lifetime of a store.

use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

/// A single rollup: bucket width and retained bucket count.
///
/// # Example
///
/// ```rust
/// use hourglass::schedule::Rollup;
///
/// // 1-minute buckets, one day of them
/// let rollup = Rollup::new(60, 1440);
/// assert_eq!(rollup.window(), 86_400);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rollup {
    /// Bucket width in seconds.
    pub granularity: u64,

    /// Number of most recent buckets retained at this granularity.
    pub retention: u32,
}

impl Rollup {
    /// Creates a rollup. Validation happens when it joins a [`RollupSchedule`].
    pub const fn new(granularity: u64, retention: u32) -> Self {
        Self {
            granularity,
            retention,
        }
    }

    /// Seconds of history this rollup retains (`granularity * retention`).
    pub fn window(&self) -> u64 {
        self.granularity.saturating_mul(u64::from(self.retention))
    }

    fn validate(&self) -> Result<(), ScheduleError> {
        if self.granularity == 0 {
            return Err(ScheduleError::ZeroGranularity);
        }
        if self.retention == 0 {
            return Err(ScheduleError::ZeroRetention {
                granularity: self.granularity,
            });
        }
        Ok(())
    }
}

/// Validated rollups, sorted from finest to coarsest granularity.
///
/// Deserialization goes through [`RollupSchedule::new`], so a JSON document
/// with duplicate or zero granularities is rejected at load time.
///
/// ```rust
/// use hourglass::schedule::{Rollup, RollupSchedule};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let schedule = RollupSchedule::new(vec![Rollup::new(3600, 24), Rollup::new(60, 60)])?;
/// assert_eq!(schedule.granularities().collect::<Vec<_>>(), vec![60, 3600]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Rollup>", into = "Vec<Rollup>")]
pub struct RollupSchedule {
    rollups: Vec<Rollup>,
}

impl RollupSchedule {
    /// Builds a schedule, sorting rollups by ascending granularity.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError`] if the list is empty, any rollup has a zero
    /// granularity or retention, or two rollups share a granularity.
    pub fn new(mut rollups: Vec<Rollup>) -> Result<Self, ScheduleError> {
        if rollups.is_empty() {
            return Err(ScheduleError::NoRollups);
        }

        for rollup in &rollups {
            rollup.validate()?;
        }

        rollups.sort_by_key(|rollup| rollup.granularity);

        if let Some(pair) = rollups
            .windows(2)
            .find(|pair| pair[0].granularity == pair[1].granularity)
        {
            return Err(ScheduleError::DuplicateGranularity {
                granularity: pair[0].granularity,
            });
        }

        Ok(Self { rollups })
    }

    /// Rollups from finest to coarsest.
    pub fn rollups(&self) -> &[Rollup] {
        &self.rollups
    }

    /// Configured granularities from finest to coarsest.
    pub fn granularities(&self) -> impl Iterator<Item = u64> + '_ {
        self.rollups.iter().map(|rollup| rollup.granularity)
    }

    /// Looks up the rollup with the given granularity.
    pub fn get(&self, granularity: u64) -> Option<&Rollup> {
        self.rollups
            .iter()
            .find(|rollup| rollup.granularity == granularity)
    }

    /// The finest rollup.
    pub fn finest(&self) -> &Rollup {
        // Non-empty by construction.
        &self.rollups[0]
    }

    /// The coarsest rollup.
    pub fn coarsest(&self) -> &Rollup {
        &self.rollups[self.rollups.len() - 1]
    }

    /// Number of rollups in the schedule.
    pub fn len(&self) -> usize {
        self.rollups.len()
    }

    /// Always `false`; a schedule holds at least one rollup.
    pub fn is_empty(&self) -> bool {
        self.rollups.is_empty()
    }
}

impl Default for RollupSchedule {
    /// Ten-second buckets for an hour, hourly buckets for a week.
    fn default() -> Self {
        Self {
            rollups: vec![Rollup::new(10, 360), Rollup::new(3600, 24 * 7)],
        }
    }
}

impl TryFrom<Vec<Rollup>> for RollupSchedule {
    type Error = ScheduleError;

    fn try_from(rollups: Vec<Rollup>) -> Result<Self, Self::Error> {
        Self::new(rollups)
    }
}

impl From<RollupSchedule> for Vec<Rollup> {
    fn from(schedule: RollupSchedule) -> Self {
        schedule.rollups
    }
}
