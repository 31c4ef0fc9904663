//! Identifiers that address buckets: metric kinds, environments, and the
//! composite [`BucketKey`] coordinate.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a concrete environment.
pub type EnvironmentId = u64;

/// Opaque metric namespace chosen by the caller.
///
/// The store assumes nothing about which kinds exist. Callers usually declare
/// their kinds as constants:
///
/// ```rust
/// use hourglass::Kind;
///
/// const EVENTS_PER_GROUP: Kind = Kind::from_static("events-per-group");
/// assert_eq!(EVENTS_PER_GROUP.as_str(), "events-per-group");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kind(Cow<'static, str>);

impl Kind {
    /// Creates a kind from an owned or borrowed name.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Creates a kind from a static name, usable in `const` items.
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// The kind's name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Kind {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

impl From<String> for Kind {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

/// Environment dimension of a bucket.
///
/// `Aggregate` sorts before every concrete id, so a key range over one entity
/// visits the aggregate buckets first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Environment {
    /// All environments combined.
    #[default]
    Aggregate,

    /// A single concrete environment.
    Id(EnvironmentId),
}

impl Environment {
    /// Buckets a write scoped to `environment` lands in: always the aggregate,
    /// plus the concrete environment when one is given.
    pub(crate) fn targets(environment: Option<EnvironmentId>) -> impl Iterator<Item = Self> {
        std::iter::once(Self::Aggregate).chain(environment.map(Self::Id))
    }
}

impl From<Option<EnvironmentId>> for Environment {
    fn from(environment: Option<EnvironmentId>) -> Self {
        environment.map_or(Self::Aggregate, Self::Id)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aggregate => f.write_str("aggregate"),
            Self::Id(id) => write!(f, "{id}"),
        }
    }
}

/// Full coordinate of one bucket.
///
/// Field order is the sort order: all buckets of one `(kind, key)` entity are
/// contiguous, grouped by environment, then granularity, then epoch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketKey {
    /// Metric namespace.
    pub kind: Kind,
    /// Entity the metric belongs to.
    pub key: String,
    /// Environment dimension.
    pub environment: Environment,
    /// Bucket width in seconds.
    pub granularity: u64,
    /// Bucket start time in Unix seconds.
    pub epoch: u64,
}

impl BucketKey {
    /// Creates a bucket coordinate.
    pub fn new(
        kind: Kind,
        key: impl Into<String>,
        environment: Environment,
        granularity: u64,
        epoch: u64,
    ) -> Self {
        Self {
            kind,
            key: key.into(),
            environment,
            granularity,
            epoch,
        }
    }

    /// Smallest and largest coordinates of the `(kind, key)` entity.
    pub(crate) fn entity_bounds(kind: &Kind, key: &str) -> (Self, Self) {
        (
            Self::new(kind.clone(), key, Environment::Aggregate, 0, 0),
            Self::new(
                kind.clone(),
                key,
                Environment::Id(EnvironmentId::MAX),
                u64::MAX,
                u64::MAX,
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_constructors_agree() {
        let owned = Kind::from("events".to_string());
        let borrowed = Kind::from_static("events");
        assert_eq!(owned, borrowed);
        assert_eq!(owned.to_string(), "events");
    }

    #[test]
    fn test_environment_targets() {
        let targets: Vec<_> = Environment::targets(Some(7)).collect();
        assert_eq!(targets, vec![Environment::Aggregate, Environment::Id(7)]);

        let targets: Vec<_> = Environment::targets(None).collect();
        assert_eq!(targets, vec![Environment::Aggregate]);
    }

    #[test]
    fn test_bucket_key_entity_ordering() {
        let kind = Kind::from_static("k");
        let (lo, hi) = BucketKey::entity_bounds(&kind, "g1");

        let inside = BucketKey::new(kind.clone(), "g1", Environment::Id(3), 60, 120);
        let neighbour = BucketKey::new(kind, "g2", Environment::Aggregate, 0, 0);

        assert!(lo <= inside && inside <= hi);
        assert!(neighbour > hi);
        assert!(Environment::Aggregate < Environment::Id(0));
    }
}
