//! The individual consistency checks.
//!
//! Each check reads what it needs through [`RowSource`] and returns a
//! [`CheckResult`]. Errors are returned as-is; the verifier turns them into a
//! failed result for that check alone.

use std::collections::{BTreeMap, HashMap, HashSet};

use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};

use super::types::{CheckKind, CheckResult};
use crate::domain::entity::ENTITIES;
use crate::domain::schema::TARGET_SCHEMA;
use crate::domain::traits::{RowQuery, RowSource, TargetStore};
use crate::error::{EtlError, Result};

/// Lowercase hex SHA-256.
pub const CHECKSUM_PATTERN: &str = "^[a-f0-9]{64}$";

/// Tables whose rows carry a content checksum.
const CHECKSUMMED_TABLES: [&str; 2] = ["agencies", "corrections"];

/// Target row count equals source row count for every entity.
pub async fn counts(source: &dyn RowSource, target: &dyn TargetStore) -> Result<CheckResult> {
    let mut mismatches = Vec::new();
    for entity in ENTITIES {
        let expected = source.count_rows(entity.source_relation).await?;
        let actual = target.count_rows(entity.target_table).await?;
        if expected != actual {
            mismatches.push(format!(
                "{}: source {} rows, target {} rows",
                entity.name, expected, actual
            ));
        }
    }

    Ok(if mismatches.is_empty() {
        CheckResult::pass(
            CheckKind::Counts,
            format!("{} entities match source", ENTITIES.len()),
        )
    } else {
        CheckResult::fail(
            CheckKind::Counts,
            format!("{} entities differ from source", mismatches.len()),
            mismatches,
        )
    })
}

/// No null checksum, and every checksum is lowercase 64-char hex.
pub async fn checksums(target: &dyn TargetStore) -> Result<CheckResult> {
    let pattern = Regex::new(CHECKSUM_PATTERN).map_err(|e| EtlError::Config(e.to_string()))?;
    let mut problems = Vec::new();
    let mut checked = 0usize;

    for table in CHECKSUMMED_TABLES {
        let rows = target
            .fetch_rows(&RowQuery::new(table, &["checksum"]))
            .await?;
        checked += rows.len();

        let nulls = rows.iter().filter(|r| r[0].is_null()).count();
        let invalid = rows
            .iter()
            .filter_map(|r| r[0].as_str())
            .filter(|s| !pattern.is_match(s))
            .count();
        if nulls > 0 {
            problems.push(format!("{}: {} null checksums", table, nulls));
        }
        if invalid > 0 {
            problems.push(format!("{}: {} malformed checksums", table, invalid));
        }
    }

    Ok(if problems.is_empty() {
        CheckResult::pass(
            CheckKind::Checksums,
            format!("{} checksums valid", checked),
        )
    } else {
        CheckResult::fail(CheckKind::Checksums, "invalid checksums found", problems)
    })
}

/// Every metric and every parent link resolves to an existing agency.
pub async fn referential(target: &dyn TargetStore) -> Result<CheckResult> {
    let agencies = target
        .fetch_rows(&RowQuery::new("agencies", &["slug", "parent_slug"]))
        .await?;
    let slugs: HashSet<&str> = agencies.iter().filter_map(|r| r[0].as_str()).collect();

    let mut dangling = Vec::new();
    for row in &agencies {
        if let Some(parent) = row[1].as_str() {
            if !slugs.contains(parent) {
                dangling.push(format!(
                    "agencies.parent_slug={} (agency {})",
                    parent,
                    row[0].as_str().unwrap_or("?")
                ));
            }
        }
    }

    let metrics = target
        .fetch_rows(&RowQuery::new("agency_metrics", &["agency_slug"]))
        .await?;
    for row in &metrics {
        match row[0].as_str() {
            Some(slug) if slugs.contains(slug) => {}
            Some(slug) => dangling.push(format!("agency_metrics.agency_slug={}", slug)),
            None => dangling.push("agency_metrics.agency_slug is NULL".to_string()),
        }
    }

    Ok(if dangling.is_empty() {
        CheckResult::pass(CheckKind::Referential, "no dangling references")
    } else {
        CheckResult::fail(
            CheckKind::Referential,
            format!("{} dangling references", dangling.len()),
            dangling,
        )
    })
}

/// Expected RVI: corrections per hundred CFR references, banker's-rounded to 2 places.
pub fn expected_rvi(total_corrections: i64, references: i64) -> Option<Decimal> {
    if references <= 0 {
        return None;
    }
    let ratio = Decimal::from(total_corrections).checked_div(Decimal::from(references))?;
    Some(
        (ratio * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven),
    )
}

/// Stored RVI agrees with a recomputation within 0.01.
pub async fn metric_accuracy(target: &dyn TargetStore) -> Result<CheckResult> {
    let tolerance = Decimal::new(1, 2);

    let agencies = target
        .fetch_rows(&RowQuery::new("agencies", &["slug", "total_cfr_references"]))
        .await?;
    let references: HashMap<&str, i64> = agencies
        .iter()
        .filter_map(|r| Some((r[0].as_str()?, r[1].as_i64()?)))
        .collect();

    let metrics = target
        .fetch_rows(&RowQuery::new(
            "agency_metrics",
            &["agency_slug", "total_corrections", "rvi"],
        ))
        .await?;

    let mut checked = 0usize;
    let mut off = Vec::new();
    for row in &metrics {
        let Some(slug) = row[0].as_str() else { continue };
        let Some(refs) = references.get(slug).copied() else { continue };
        let corrections = row[1].as_i64().unwrap_or(0);
        let Some(expected) = expected_rvi(corrections, refs) else { continue };

        checked += 1;
        let stored = row[2].as_decimal().unwrap_or(Decimal::ZERO);
        if (stored - expected).abs() >= tolerance {
            off.push(format!("{}: stored {}, expected {}", slug, stored, expected));
        }
    }

    Ok(if off.is_empty() {
        CheckResult::pass(
            CheckKind::MetricAccuracy,
            format!("{} metrics within tolerance", checked),
        )
    } else {
        CheckResult::fail(
            CheckKind::MetricAccuracy,
            format!("{} of {} metrics off", off.len(), checked),
            off,
        )
    })
}

/// Per-year time-series sums equal per-year correction counts.
pub async fn aggregates(target: &dyn TargetStore) -> Result<CheckResult> {
    let series = target
        .fetch_rows(&RowQuery::new(
            "correction_time_series",
            &["year", "correction_count"],
        ))
        .await?;
    let mut sums: BTreeMap<i64, i64> = BTreeMap::new();
    for row in &series {
        if let Some(year) = row[0].as_i64() {
            *sums.entry(year).or_default() += row[1].as_i64().unwrap_or(0);
        }
    }

    let corrections = target
        .fetch_rows(&RowQuery::new("corrections", &["year"]))
        .await?;
    let mut counts: HashMap<i64, i64> = HashMap::new();
    for row in &corrections {
        if let Some(year) = row[0].as_i64() {
            *counts.entry(year).or_default() += 1;
        }
    }

    let mismatched: Vec<String> = sums
        .iter()
        .filter_map(|(year, sum)| {
            let actual = counts.get(year).copied().unwrap_or(0);
            (actual != *sum).then(|| {
                format!("{}: time series {}, corrections {}", year, sum, actual)
            })
        })
        .collect();

    Ok(if mismatched.is_empty() {
        CheckResult::pass(
            CheckKind::Aggregates,
            format!("{} years consistent", sums.len()),
        )
    } else {
        CheckResult::fail(
            CheckKind::Aggregates,
            format!("{} years inconsistent", mismatched.len()),
            mismatched,
        )
    })
}

/// Every read view returns rows after a non-empty load.
pub async fn views(target: &dyn TargetStore) -> Result<CheckResult> {
    let mut loaded = 0i64;
    for entity in ENTITIES {
        loaded += target.count_rows(entity.target_table).await?;
    }
    if loaded == 0 {
        return Ok(CheckResult::pass(
            CheckKind::Views,
            "not applicable: nothing loaded",
        ));
    }

    let mut empty = Vec::new();
    for view in TARGET_SCHEMA.views {
        if target.count_rows(view.name).await? == 0 {
            empty.push(view.name.to_string());
        }
    }

    Ok(if empty.is_empty() {
        CheckResult::pass(
            CheckKind::Views,
            format!("{} views return rows", TARGET_SCHEMA.views.len()),
        )
    } else {
        CheckResult::fail(
            CheckKind::Views,
            format!("{} views empty", empty.len()),
            empty,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_expected_rvi_rounding() {
        assert_eq!(expected_rvi(12, 550), Some(Decimal::from_str("2.18").unwrap()));
        assert_eq!(expected_rvi(1, 3), Some(Decimal::from_str("33.33").unwrap()));
        assert_eq!(expected_rvi(5, 0), None);
    }

    #[test]
    fn test_checksum_pattern() {
        let re = Regex::new(CHECKSUM_PATTERN).unwrap();
        assert!(re.is_match(&"a".repeat(64)));
        assert!(re.is_match(&"0123456789abcdef".repeat(4)));
        assert!(!re.is_match(&"A".repeat(64)));
        assert!(!re.is_match(&"a".repeat(63)));
        assert!(!re.is_match(&format!("{}g", "a".repeat(63))));
    }
}
