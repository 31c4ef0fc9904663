//! Weighted member tables used by frequency (top-k) buckets.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::btree_map;

use serde::{Deserialize, Serialize};

/// Ordered mapping from member to accumulated score.
///
/// Tables combine by per-member summation. Ranking ([`most_common`]) orders by
/// descending score and breaks ties by ascending member, so the result never
/// depends on insertion order.
///
/// ```rust
/// use hourglass::FrequencyTable;
///
/// let mut table: FrequencyTable = [("b", 3.0), ("a", 5.0), ("c", 5.0)].into_iter().collect();
/// table.add("b", 1.0);
///
/// assert_eq!(table.get("b"), 4.0);
/// assert_eq!(
///     table.most_common(Some(2)),
///     vec![("a".to_string(), 5.0), ("c".to_string(), 5.0)]
/// );
/// ```
///
/// [`most_common`]: FrequencyTable::most_common
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrequencyTable {
    scores: BTreeMap<String, f64>,
}

impl FrequencyTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `score` to `member`'s accumulated score.
    pub fn add(&mut self, member: impl Into<String>, score: f64) {
        *self.scores.entry(member.into()).or_insert(0.0) += score;
    }

    /// Sets `member`'s score, replacing any accumulated value.
    pub fn insert(&mut self, member: impl Into<String>, score: f64) {
        self.scores.insert(member.into(), score);
    }

    /// Score of `member`, or `0.0` if it was never recorded.
    pub fn get(&self, member: &str) -> f64 {
        self.scores.get(member).copied().unwrap_or(0.0)
    }

    /// Whether `member` has an entry.
    pub fn contains(&self, member: &str) -> bool {
        self.scores.contains_key(member)
    }

    /// Folds every score of `other` into this table.
    pub fn merge(&mut self, other: &Self) {
        for (member, score) in &other.scores {
            self.add(member.as_str(), *score);
        }
    }

    /// Members ranked by descending score, ties broken by ascending member,
    /// truncated to `limit` entries when one is given.
    pub fn most_common(&self, limit: Option<usize>) -> Vec<(String, f64)> {
        let mut ranked: Vec<(&String, f64)> = self
            .scores
            .iter()
            .map(|(member, score)| (member, *score))
            .collect();
        ranked.sort_by(|a, b| rank(a, b));

        ranked
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|(member, score)| (member.clone(), score))
            .collect()
    }

    /// The `limit` highest-ranked members as a table.
    pub fn top(&self, limit: Option<usize>) -> Self {
        if limit.is_none_or(|limit| limit >= self.scores.len()) {
            return self.clone();
        }
        self.most_common(limit).into_iter().collect()
    }

    /// Scores of exactly `members`, reporting absent members as `0.0`.
    pub fn select<S: AsRef<str>>(&self, members: &[S]) -> Self {
        members
            .iter()
            .map(|member| {
                let member = member.as_ref();
                (member.to_string(), self.get(member))
            })
            .collect()
    }

    /// Sum of all scores.
    pub fn total(&self) -> f64 {
        self.scores.values().sum()
    }

    /// Number of members in the table.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Whether the table has no members.
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Iterates `(member, score)` pairs in member order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.scores
            .iter()
            .map(|(member, score)| (member.as_str(), *score))
    }
}

fn rank(a: &(&String, f64), b: &(&String, f64)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0))
}

impl<K: Into<String>> FromIterator<(K, f64)> for FrequencyTable {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (member, score) in iter {
            table.add(member, score);
        }
        table
    }
}

impl IntoIterator for FrequencyTable {
    type Item = (String, f64);
    type IntoIter = btree_map::IntoIter<String, f64>;

    fn into_iter(self) -> Self::IntoIter {
        self.scores.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_sums_per_member() {
        let mut left: FrequencyTable = [("a", 1.0), ("b", 2.0)].into_iter().collect();
        let right: FrequencyTable = [("b", 0.5), ("c", 4.0)].into_iter().collect();

        left.merge(&right);

        assert_eq!(left.get("a"), 1.0);
        assert_eq!(left.get("b"), 2.5);
        assert_eq!(left.get("c"), 4.0);
        assert_eq!(left.total(), 7.5);
    }

    #[test]
    fn test_most_common_tie_break_is_lexicographic() {
        let table: FrequencyTable = [("c", 5.0), ("b", 3.0), ("a", 5.0)].into_iter().collect();

        assert_eq!(
            table.most_common(None),
            vec![
                ("a".to_string(), 5.0),
                ("c".to_string(), 5.0),
                ("b".to_string(), 3.0),
            ]
        );
        assert_eq!(table.most_common(Some(1)), vec![("a".to_string(), 5.0)]);
        assert!(table.most_common(Some(0)).is_empty());
    }

    #[test]
    fn test_top_keeps_highest() {
        let table: FrequencyTable = [("x", 1.0), ("y", 9.0), ("z", 4.0)].into_iter().collect();

        let top = table.top(Some(2));
        assert_eq!(top.len(), 2);
        assert!(top.contains("y"));
        assert!(top.contains("z"));
        assert!(!top.contains("x"));

        assert_eq!(table.top(None), table);
        assert_eq!(table.top(Some(10)), table);
    }

    #[test]
    fn test_select_reports_absent_as_zero() {
        let table: FrequencyTable = [("a", 2.0), ("b", 1.0)].into_iter().collect();

        let selected = table.select(&["a", "missing"]);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected.get("a"), 2.0);
        assert!(selected.contains("missing"));
        assert_eq!(selected.get("missing"), 0.0);
        assert!(!selected.contains("b"));
    }

    #[test]
    fn test_negative_scores_reduce_totals() {
        let mut table = FrequencyTable::new();
        table.add("a", 3.0);
        table.add("a", -1.0);
        assert_eq!(table.get("a"), 2.0);
    }
}
