//! The five entities moved from the lake into the serving database.
//!
//! Each [`EntitySpec`] names the source relation, its ordering key and the
//! column mapping onto the target table. Mappings are 1:1 copies with a type
//! coercion, except `word_count_estimate` which is derived at transfer time.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Serialize;

use super::traits::RowQuery;
use super::value::{Row, SqlNullType, SqlValue};

/// Estimated words per CFR reference, used for `word_count_estimate`.
pub const WORDS_PER_CFR_REFERENCE: i64 = 500;

/// Target column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Int4,
    Int8,
    Numeric,
    Float8,
    Date,
    Timestamp,
}

impl ColumnType {
    /// PostgreSQL type name used in casts.
    pub fn pg_name(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Int4 => "integer",
            ColumnType::Int8 => "bigint",
            ColumnType::Numeric => "numeric",
            ColumnType::Float8 => "double precision",
            ColumnType::Date => "date",
            ColumnType::Timestamp => "timestamp",
        }
    }

    /// Null hint for a missing value of this type.
    pub fn null_type(&self) -> SqlNullType {
        match self {
            ColumnType::Text => SqlNullType::String,
            ColumnType::Int4 => SqlNullType::I32,
            ColumnType::Int8 => SqlNullType::I64,
            ColumnType::Numeric => SqlNullType::Decimal,
            ColumnType::Float8 => SqlNullType::F64,
            ColumnType::Date => SqlNullType::Date,
            ColumnType::Timestamp => SqlNullType::DateTime,
        }
    }
}

/// A typed target column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
}

impl ColumnDef {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self { name, ty }
    }
}

/// How a target value is produced from its source column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingRule {
    /// Copy the value, coerced to the target type.
    Copy,
    /// Multiply an integer source value by a constant.
    Scaled(i64),
}

/// Mapping of one source column onto one target column.
#[derive(Debug, Clone, Copy)]
pub struct ColumnMapping {
    pub source: &'static str,
    pub target: ColumnDef,
    pub rule: MappingRule,
}

impl ColumnMapping {
    const fn copy(source: &'static str, target: &'static str, ty: ColumnType) -> Self {
        Self {
            source,
            target: ColumnDef::new(target, ty),
            rule: MappingRule::Copy,
        }
    }

    const fn same(name: &'static str, ty: ColumnType) -> Self {
        Self::copy(name, name, ty)
    }

    const fn scaled(
        source: &'static str,
        target: &'static str,
        ty: ColumnType,
        factor: i64,
    ) -> Self {
        Self {
            source,
            target: ColumnDef::new(target, ty),
            rule: MappingRule::Scaled(factor),
        }
    }

    /// Produce the target value from a source value.
    pub fn apply(&self, value: SqlValue) -> std::result::Result<SqlValue, String> {
        match self.rule {
            MappingRule::Copy => coerce(value, self.target.ty),
            MappingRule::Scaled(factor) => {
                if value.is_null() {
                    return Ok(SqlValue::Null(self.target.ty.null_type()));
                }
                let base = value.as_i64().ok_or_else(|| {
                    format!("{} is not an integer: {}", self.source, value)
                })?;
                let scaled = base
                    .checked_mul(factor)
                    .ok_or_else(|| format!("{} × {} overflows", base, factor))?;
                coerce(SqlValue::I64(scaled), self.target.ty)
            }
        }
    }
}

/// One entity transfer: source relation, ordering and column mapping.
#[derive(Debug, Clone, Copy)]
pub struct EntitySpec {
    pub name: &'static str,
    pub source_relation: &'static str,
    pub target_table: &'static str,
    pub columns: &'static [ColumnMapping],
    pub order_by: &'static [&'static str],
}

impl EntitySpec {
    /// Ordered extraction query against the source.
    pub fn source_query(&self) -> RowQuery {
        RowQuery {
            relation: self.source_relation.to_string(),
            columns: self.columns.iter().map(|c| c.source.to_string()).collect(),
            order_by: self.order_by.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Target column definitions, in insert order.
    pub fn target_columns(&self) -> Vec<ColumnDef> {
        self.columns.iter().map(|c| c.target).collect()
    }

    /// Map one source row onto the target columns.
    pub fn map_row(&self, row: Row) -> std::result::Result<Row, String> {
        if row.len() != self.columns.len() {
            return Err(format!(
                "expected {} columns from {}, got {}",
                self.columns.len(),
                self.source_relation,
                row.len()
            ));
        }
        self.columns
            .iter()
            .zip(row)
            .map(|(mapping, value)| {
                mapping
                    .apply(value)
                    .map_err(|e| format!("column {}: {}", mapping.target.name, e))
            })
            .collect()
    }
}

use ColumnType::*;

pub const AGENCIES: EntitySpec = EntitySpec {
    name: "agencies",
    source_relation: "agencies_parsed",
    target_table: "agencies",
    columns: &[
        ColumnMapping::same("slug", Text),
        ColumnMapping::same("name", Text),
        ColumnMapping::same("short_name", Text),
        ColumnMapping::same("parent_slug", Text),
        ColumnMapping::copy("cfr_reference_count", "total_cfr_references", Int4),
        ColumnMapping::same("child_count", Int4),
        ColumnMapping::same("checksum", Text),
    ],
    order_by: &["id"],
};

pub const CORRECTIONS: EntitySpec = EntitySpec {
    name: "corrections",
    source_relation: "corrections_parsed",
    target_table: "corrections",
    columns: &[
        ColumnMapping::same("ecfr_id", Text),
        ColumnMapping::same("cfr_reference", Text),
        ColumnMapping::same("title", Int4),
        ColumnMapping::same("chapter", Text),
        ColumnMapping::same("part", Text),
        ColumnMapping::same("section", Text),
        ColumnMapping::same("corrective_action", Text),
        ColumnMapping::same("error_occurred", Date),
        ColumnMapping::same("error_corrected", Date),
        ColumnMapping::same("lag_days", Int4),
        ColumnMapping::same("fr_citation", Text),
        ColumnMapping::same("year", Int4),
        ColumnMapping::same("checksum", Text),
    ],
    order_by: &["id"],
};

pub const AGENCY_METRICS: EntitySpec = EntitySpec {
    name: "agency_metrics",
    source_relation: "agency_metrics",
    target_table: "agency_metrics",
    columns: &[
        ColumnMapping::copy("slug", "agency_slug", Text),
        ColumnMapping::same("total_corrections", Int4),
        ColumnMapping::same("years_with_corrections", Int4),
        ColumnMapping::same("first_correction_year", Int4),
        ColumnMapping::same("last_correction_year", Int4),
        ColumnMapping::same("avg_correction_lag_days", Numeric),
        ColumnMapping::same("rvi", Numeric),
        ColumnMapping::scaled(
            "cfr_reference_count",
            "word_count_estimate",
            Int8,
            WORDS_PER_CFR_REFERENCE,
        ),
    ],
    order_by: &["slug"],
};

pub const TIME_SERIES: EntitySpec = EntitySpec {
    name: "correction_time_series",
    source_relation: "correction_time_series",
    target_table: "correction_time_series",
    columns: &[
        ColumnMapping::same("year", Int4),
        ColumnMapping::same("month", Int4),
        ColumnMapping::same("correction_count", Int4),
        ColumnMapping::same("avg_lag_days", Numeric),
    ],
    order_by: &["year", "month"],
};

pub const TITLE_STATS: EntitySpec = EntitySpec {
    name: "cfr_title_stats",
    source_relation: "correction_trends_by_title",
    target_table: "cfr_title_stats",
    columns: &[
        ColumnMapping::same("title", Int4),
        ColumnMapping::same("correction_count", Int4),
        ColumnMapping::same("years_active", Int4),
        ColumnMapping::same("first_year", Int4),
        ColumnMapping::same("last_year", Int4),
        ColumnMapping::same("avg_lag_days", Numeric),
    ],
    order_by: &["title"],
};

/// All entities, in transfer order (referenced tables first).
pub const ENTITIES: [EntitySpec; 5] = [
    AGENCIES,
    CORRECTIONS,
    AGENCY_METRICS,
    TIME_SERIES,
    TITLE_STATS,
];

/// Coerce a source value to a target column type.
pub fn coerce(value: SqlValue, ty: ColumnType) -> std::result::Result<SqlValue, String> {
    if value.is_null() {
        return Ok(SqlValue::Null(ty.null_type()));
    }

    let mismatch = |v: &SqlValue| format!("cannot convert {:?} to {}", v, ty.pg_name());

    match ty {
        ColumnType::Text => Ok(match value {
            SqlValue::Text(s) => SqlValue::Text(s),
            other => SqlValue::Text(other.to_string()),
        }),
        ColumnType::Int4 => {
            let v = value.as_i64().ok_or_else(|| mismatch(&value))?;
            i32::try_from(v)
                .map(SqlValue::I32)
                .map_err(|_| format!("{} out of range for integer", v))
        }
        ColumnType::Int8 => value
            .as_i64()
            .map(SqlValue::I64)
            .ok_or_else(|| mismatch(&value)),
        ColumnType::Numeric => match &value {
            SqlValue::Decimal(d) => Ok(SqlValue::Decimal(*d)),
            SqlValue::I32(v) => Ok(SqlValue::Decimal(Decimal::from(*v))),
            SqlValue::I64(v) => Ok(SqlValue::Decimal(Decimal::from(*v))),
            SqlValue::F64(v) => Decimal::try_from(*v)
                .map(SqlValue::Decimal)
                .map_err(|_| mismatch(&value)),
            SqlValue::Text(s) => Decimal::from_str(s.trim())
                .map(SqlValue::Decimal)
                .map_err(|_| mismatch(&value)),
            _ => Err(mismatch(&value)),
        },
        ColumnType::Float8 => value
            .as_f64()
            .map(SqlValue::F64)
            .ok_or_else(|| mismatch(&value)),
        ColumnType::Date => match &value {
            SqlValue::Date(d) => Ok(SqlValue::Date(*d)),
            SqlValue::DateTime(dt) => Ok(SqlValue::Date(dt.date())),
            SqlValue::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(SqlValue::Date)
                .map_err(|_| mismatch(&value)),
            _ => Err(mismatch(&value)),
        },
        ColumnType::Timestamp => match &value {
            SqlValue::DateTime(dt) => Ok(SqlValue::DateTime(*dt)),
            SqlValue::Date(d) => d
                .and_hms_opt(0, 0, 0)
                .map(SqlValue::DateTime)
                .ok_or_else(|| mismatch(&value)),
            SqlValue::Text(s) => NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S%.f")
                .map(SqlValue::DateTime)
                .map_err(|_| mismatch(&value)),
            _ => Err(mismatch(&value)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entities_cover_five_distinct_tables() {
        let mut tables: Vec<_> = ENTITIES.iter().map(|e| e.target_table).collect();
        tables.sort_unstable();
        tables.dedup();
        assert_eq!(tables.len(), 5);
    }

    #[test]
    fn test_agency_reference_count_is_renamed() {
        let query = AGENCIES.source_query();
        assert!(query.columns.contains(&"cfr_reference_count".to_string()));
        let targets: Vec<_> = AGENCIES.target_columns().iter().map(|c| c.name).collect();
        assert!(targets.contains(&"total_cfr_references"));
        assert!(!targets.contains(&"cfr_reference_count"));
    }

    #[test]
    fn test_word_count_is_derived() {
        let row = vec![
            SqlValue::from("epa"),
            SqlValue::I64(12),
            SqlValue::I64(3),
            SqlValue::I32(2019),
            SqlValue::I32(2024),
            SqlValue::F64(41.5),
            SqlValue::F64(2.18),
            SqlValue::I64(550),
        ];
        let mapped = AGENCY_METRICS.map_row(row).unwrap();
        assert_eq!(mapped[0], SqlValue::from("epa"));
        assert_eq!(mapped[1], SqlValue::I32(12));
        assert_eq!(mapped[7], SqlValue::I64(275_000));
    }

    #[test]
    fn test_null_reference_count_gives_null_estimate() {
        let mapping = AGENCY_METRICS.columns[7];
        let out = mapping.apply(SqlValue::Null(SqlNullType::I64)).unwrap();
        assert_eq!(out, SqlValue::Null(SqlNullType::I64));
    }

    #[test]
    fn test_map_row_rejects_wrong_width() {
        let err = TIME_SERIES.map_row(vec![SqlValue::I32(2024)]).unwrap_err();
        assert!(err.contains("expected 4 columns"));
    }

    #[test]
    fn test_coerce_int4_range() {
        assert_eq!(coerce(SqlValue::I64(7), Int4).unwrap(), SqlValue::I32(7));
        assert!(coerce(SqlValue::I64(i64::MAX), Int4).is_err());
        assert!(coerce(SqlValue::from("abc"), Int4).is_err());
    }

    #[test]
    fn test_coerce_numeric_and_dates() {
        assert_eq!(
            coerce(SqlValue::from("12.34"), Numeric).unwrap(),
            SqlValue::Decimal(Decimal::from_str("12.34").unwrap())
        );
        let d = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        assert_eq!(coerce(SqlValue::from("2023-06-01"), Date).unwrap(), SqlValue::Date(d));
        assert_eq!(
            coerce(SqlValue::Date(d), Timestamp).unwrap(),
            SqlValue::DateTime(d.and_hms_opt(0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_coerce_text_renders_other_types() {
        assert_eq!(coerce(SqlValue::I64(42), Text).unwrap(), SqlValue::from("42"));
        assert_eq!(
            coerce(SqlValue::Null(SqlNullType::I64), Text).unwrap(),
            SqlValue::Null(SqlNullType::String)
        );
    }
}
