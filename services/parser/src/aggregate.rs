//! Monthly/group aggregation over validated records.
//!
//! Grouping is document-type-specific: single-year workbooks group by
//! month, multi-year workbooks by (month, year). Merging January-2024
//! into January-2025 is a silent correctness failure, so the year is part
//! of the key whenever the family carries one.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::extract::{Record, Value};
use crate::normalize;

/// What to aggregate and how. `star_field` is summed per secondary entity
/// to pick the group's "star".
#[derive(Debug, Clone, Copy)]
pub struct GroupSpec {
    /// Group by (month, year) instead of month alone.
    pub by_year: bool,
    /// Secondary entity field (client, provider, department...) used for
    /// distinct counts and star selection.
    pub secondary: Option<&'static str>,
    pub sum_fields: &'static [&'static str],
    pub mean_fields: &'static [&'static str],
    pub star_field: &'static str,
}

/// Aggregation bucket key. Ordered year-first so summaries come out in
/// chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GroupKey {
    pub year: Option<i32>,
    pub month: u32,
}

/// The entity with the highest summed value inside one group. Ties break
/// by first-encountered order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StarEntity {
    pub name: String,
    pub total: f64,
}

/// Aggregate statistics for one (month[, year]) bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySummary {
    pub month: u32,
    pub month_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    pub count: usize,
    pub sums: BTreeMap<&'static str, f64>,
    pub means: BTreeMap<&'static str, f64>,
    pub distinct_secondary: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub star: Option<StarEntity>,
}

/// Per-group accumulation state. Entity totals keep insertion order so
/// star ties resolve to the first entity seen.
struct Bucket {
    count: usize,
    sums: BTreeMap<&'static str, f64>,
    mean_sums: BTreeMap<&'static str, f64>,
    mean_counts: BTreeMap<&'static str, usize>,
    entity_totals: Vec<(String, f64)>,
}

impl Bucket {
    fn new() -> Self {
        Self {
            count: 0,
            sums: BTreeMap::new(),
            mean_sums: BTreeMap::new(),
            mean_counts: BTreeMap::new(),
            entity_totals: Vec::new(),
        }
    }
}

/// Group records and compute per-bucket statistics. Records without the
/// required period fields are ignored (families derive them up front, so
/// this only happens for shapes without a period at all).
pub fn aggregate(records: &[Record], spec: &GroupSpec) -> BTreeMap<GroupKey, MonthlySummary> {
    let mut buckets: BTreeMap<GroupKey, Bucket> = BTreeMap::new();

    for record in records {
        let Some(month) = record.get("mes").and_then(Value::as_month) else {
            continue;
        };
        let year = if spec.by_year {
            match record.get("anio").and_then(Value::as_year) {
                Some(y) => Some(y),
                // by_year families must carry a year; refuse to merge.
                None => continue,
            }
        } else {
            None
        };

        let bucket = buckets.entry(GroupKey { year, month }).or_insert_with(Bucket::new);
        bucket.count += 1;

        for field in spec.sum_fields {
            *bucket.sums.entry(field).or_insert(0.0) += record.number(field);
        }
        for field in spec.mean_fields {
            if let Some(v) = record.get(field).and_then(Value::as_number) {
                *bucket.mean_sums.entry(field).or_insert(0.0) += v;
                *bucket.mean_counts.entry(field).or_insert(0) += 1;
            }
        }

        if let Some(secondary) = spec.secondary {
            if let Some(entity) = record.text(secondary) {
                let star_value = record.number(spec.star_field);
                match bucket.entity_totals.iter_mut().find(|(name, _)| name == entity) {
                    Some((_, total)) => *total += star_value,
                    None => bucket.entity_totals.push((entity.to_string(), star_value)),
                }
            }
        }
    }

    buckets
        .into_iter()
        .map(|(key, bucket)| {
            let means = bucket
                .mean_sums
                .iter()
                .map(|(field, sum)| {
                    let n = bucket.mean_counts.get(field).copied().unwrap_or(0).max(1);
                    (*field, *sum / n as f64)
                })
                .collect();

            // Strictly-greater comparison keeps the first entity on ties.
            let star = bucket
                .entity_totals
                .iter()
                .fold(None::<&(String, f64)>, |best, candidate| match best {
                    Some(b) if candidate.1 > b.1 => Some(candidate),
                    Some(b) => Some(b),
                    None => Some(candidate),
                })
                .map(|(name, total)| StarEntity {
                    name: name.clone(),
                    total: *total,
                });

            let summary = MonthlySummary {
                month: key.month,
                month_name: normalize::month_name(key.month).to_string(),
                year: key.year,
                count: bucket.count,
                sums: bucket.sums,
                means,
                distinct_secondary: bucket.entity_totals.len(),
                star,
            };
            (key, summary)
        })
        .collect()
}

/// Percentage change between two summary values. The zero handling is
/// deliberate and load-bearing for dashboard compatibility: both zero is
/// 0% (not undefined), growth from zero is 100% (not infinite).
pub fn pct_change(old: f64, new: f64) -> f64 {
    if old == 0.0 && new == 0.0 {
        0.0
    } else if old == 0.0 {
        100.0
    } else {
        (new - old) / old * 100.0
    }
}

/// Thresholds for the purchases value-consistency heuristic. Kept
/// configurable; the defaults mirror the dashboard's historical behavior
/// and are pending product-owner confirmation.
#[derive(Debug, Clone, Copy)]
pub struct CorrectionPolicy {
    /// Relative deviation of `valor` from `kilos * precio` above which a
    /// row is considered inconsistent.
    pub rel_tolerance: f64,
    /// Corrections are only applied when at most this share of candidate
    /// rows is inconsistent; above it the column itself is suspect.
    pub max_affected: f64,
}

impl Default for CorrectionPolicy {
    fn default() -> Self {
        Self {
            rel_tolerance: 0.10,
            max_affected: 0.10,
        }
    }
}

/// Recompute `value_field` from `qty_field * price_field` on rows where it
/// deviates beyond the policy tolerance, but only when few enough rows
/// deviate. Each applied correction is a warning carrying the row number.
pub fn reconcile_derived_value(
    records: &mut [Record],
    qty_field: &str,
    price_field: &str,
    value_field: &'static str,
    policy: &CorrectionPolicy,
    warnings: &mut Vec<String>,
) {
    let mut candidates = 0usize;
    let mut deviating: Vec<(usize, f64)> = Vec::new();

    for (idx, record) in records.iter().enumerate() {
        let qty = record.number(qty_field);
        let price = record.number(price_field);
        let derived = qty * price;
        if derived <= 0.0 {
            continue;
        }
        candidates += 1;
        let value = record.number(value_field);
        if ((value - derived).abs() / derived) > policy.rel_tolerance {
            deviating.push((idx, derived));
        }
    }

    if deviating.is_empty() || candidates == 0 {
        return;
    }
    let share = deviating.len() as f64 / candidates as f64;
    if share > policy.max_affected {
        warnings.push(format!(
            "'{}' deviates from {}*{} on {} of {} rows; too many to auto-correct",
            value_field,
            qty_field,
            price_field,
            deviating.len(),
            candidates
        ));
        return;
    }

    for (idx, derived) in deviating {
        let record = &mut records[idx];
        let old = record.number(value_field);
        warnings.push(format!(
            "row {}: '{}' {:.2} inconsistent with {}*{}, corrected to {:.2}",
            record.source_row, value_field, old, qty_field, price_field, derived
        ));
        record.set(value_field, Value::Number(derived));
    }
}

// =============================================================================
// TESTS
// =============================================================================
