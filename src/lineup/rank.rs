use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use super::aggregate::AggregateEntry;

/// One row of the recommendation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntity {
    pub entity_key: String,
    pub averages: BTreeMap<String, f64>,
    pub sample_count: usize,
    /// Ranked with opponent history (member of the boost set).
    pub boosted: bool,
}

/// Order aggregates: boosted first, then average minutes, then average points,
/// both descending. Full ties keep their input order.
///
/// A `limit` of zero or less yields an empty list.
pub fn rank(aggregates: &[AggregateEntry], boost: &HashSet<String>, limit: i64) -> Vec<RankedEntity> {
    if limit <= 0 {
        return Vec::new();
    }

    let mut ranked: Vec<RankedEntity> = aggregates
        .iter()
        .map(|a| RankedEntity {
            entity_key: a.entity_key.clone(),
            averages: a.averages.clone(),
            sample_count: a.sample_count,
            boosted: boost.contains(&a.entity_key),
        })
        .collect();

    // sort_by is stable
    ranked.sort_by(|a, b| {
        b.boosted
            .cmp(&a.boosted)
            .then_with(|| desc(a.stat("minutes"), b.stat("minutes")))
            .then_with(|| desc(a.stat("pts"), b.stat("pts")))
    });
    ranked.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    ranked
}

fn desc(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}

impl RankedEntity {
    pub fn stat(&self, stat: &str) -> f64 {
        self.averages.get(stat).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, minutes: f64, pts: f64) -> AggregateEntry {
        AggregateEntry {
            entity_key: key.into(),
            averages: BTreeMap::from([("minutes".to_string(), minutes), ("pts".to_string(), pts)]),
            sample_count: 1,
        }
    }

    fn keys(ranked: &[RankedEntity]) -> Vec<&str> {
        ranked.iter().map(|r| r.entity_key.as_str()).collect()
    }

    #[test]
    fn boost_beats_minutes() {
        let aggs = vec![entry("A", 30.0, 20.0), entry("B", 35.0, 10.0)];
        let boost = HashSet::from(["B".to_string()]);
        let out = rank(&aggs, &boost, 2);
        assert_eq!(keys(&out), vec!["B", "A"]);
        assert!(out[0].boosted);
        assert!(!out[1].boosted);
    }

    #[test]
    fn boosted_entities_still_sort_by_minutes() {
        let aggs = vec![entry("A", 20.0, 5.0), entry("B", 36.0, 5.0), entry("C", 40.0, 30.0)];
        let boost = HashSet::from(["A".to_string(), "B".to_string()]);
        assert_eq!(keys(&rank(&aggs, &boost, 3)), vec!["B", "A", "C"]);
    }

    #[test]
    fn minutes_then_points() {
        let aggs = vec![entry("A", 30.0, 10.0), entry("B", 30.0, 25.0), entry("C", 32.0, 1.0)];
        assert_eq!(keys(&rank(&aggs, &HashSet::new(), 3)), vec!["C", "B", "A"]);
    }

    #[test]
    fn full_ties_keep_input_order() {
        let aggs = vec![entry("Z", 30.0, 10.0), entry("M", 30.0, 10.0), entry("A", 30.0, 10.0)];
        assert_eq!(keys(&rank(&aggs, &HashSet::new(), 3)), vec!["Z", "M", "A"]);
    }

    #[test]
    fn missing_stats_rank_as_zero() {
        let mut bare = entry("A", 0.0, 0.0);
        bare.averages.clear();
        let aggs = vec![bare, entry("B", 1.0, 0.0)];
        assert_eq!(keys(&rank(&aggs, &HashSet::new(), 2)), vec!["B", "A"]);
    }

    #[test]
    fn limit_truncates() {
        let aggs = vec![entry("A", 1.0, 1.0), entry("B", 2.0, 2.0), entry("C", 3.0, 3.0)];
        assert_eq!(rank(&aggs, &HashSet::new(), 2).len(), 2);
        assert_eq!(rank(&aggs, &HashSet::new(), 10).len(), 3);
    }

    #[test]
    fn non_positive_limit_is_empty() {
        let aggs = vec![entry("A", 1.0, 1.0)];
        assert!(rank(&aggs, &HashSet::new(), 0).is_empty());
        assert!(rank(&aggs, &HashSet::new(), -3).is_empty());
    }
}
