use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::store::types::Metadata;

/// Rolling averages for one entity (player).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateEntry {
    pub entity_key: String,
    pub averages: BTreeMap<String, f64>,
    pub sample_count: usize,
}

impl AggregateEntry {
    /// Average for `stat`, or 0 when it was not requested.
    pub fn stat(&self, stat: &str) -> f64 {
        self.averages.get(stat).copied().unwrap_or(0.0)
    }
}

/// Round to two decimal places.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Average each of `stat_fields` per distinct `entity_field` value.
///
/// Missing or non-numeric stats count as 0. Records without a string entity
/// key are skipped. Entities are returned in order of first appearance.
pub fn aggregate(records: &[Metadata], entity_field: &str, stat_fields: &[&str]) -> Vec<AggregateEntry> {
    let mut order: Vec<String> = Vec::new();
    let mut sums: HashMap<String, (Vec<f64>, usize)> = HashMap::new();
    let mut skipped = 0usize;

    for record in records {
        let Some(key) = record.get(entity_field).and_then(|v| v.as_str()) else {
            skipped += 1;
            continue;
        };
        let (totals, count) = sums.entry(key.to_string()).or_insert_with(|| {
            order.push(key.to_string());
            (vec![0.0; stat_fields.len()], 0)
        });
        *count += 1;
        for (total, field) in totals.iter_mut().zip(stat_fields) {
            *total += record.get(*field).and_then(|v| v.as_f64()).unwrap_or(0.0);
        }
    }

    if skipped > 0 {
        tracing::warn!(skipped, entity_field, "records without an entity key were skipped");
    }

    order
        .into_iter()
        .filter_map(|key| {
            let (totals, count) = sums.remove(&key)?;
            let averages = stat_fields
                .iter()
                .zip(totals)
                .map(|(field, total)| (field.to_string(), round2(total / count.max(1) as f64)))
                .collect();
            Some(AggregateEntry {
                entity_key: key,
                averages,
                sample_count: count,
            })
        })
        .collect()
}
