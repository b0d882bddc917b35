//! Declarative catalog of the target tables and views.

use super::entity::{ColumnDef, ColumnType};

/// How a target table is maintained across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Emptied and repopulated every run.
    FullReload,
    /// Rows are only ever appended (audit log).
    AppendOnly,
    /// Single-row run marker, rewritten at milestones.
    RunState,
}

/// A target table and the tables its foreign keys point at.
#[derive(Debug, Clone, Copy)]
pub struct TableDef {
    pub name: &'static str,
    pub depends_on: &'static [&'static str],
    pub lifecycle: Lifecycle,
}

/// A read view and the table its rows are drawn from.
#[derive(Debug, Clone, Copy)]
pub struct ViewDef {
    pub name: &'static str,
    pub base_table: &'static str,
}

/// Everything the schema initializer must ensure exists.
#[derive(Debug, Clone, Copy)]
pub struct TargetSchema {
    pub tables: &'static [TableDef],
    pub views: &'static [ViewDef],
}

impl TargetSchema {
    /// Tables emptied at the start of every run.
    pub fn full_reload_tables(&self) -> impl Iterator<Item = &TableDef> {
        self.tables
            .iter()
            .filter(|t| t.lifecycle == Lifecycle::FullReload)
    }

    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }
}

pub const ETL_LOG: &str = "etl_log";
pub const LOAD_STATE: &str = "etl_load_state";
pub const DATA_CHECKSUMS: &str = "data_checksums";

pub static TARGET_SCHEMA: TargetSchema = TargetSchema {
    tables: &[
        TableDef {
            name: "agencies",
            // parent_slug
            depends_on: &["agencies"],
            lifecycle: Lifecycle::FullReload,
        },
        TableDef {
            name: "corrections",
            depends_on: &[],
            lifecycle: Lifecycle::FullReload,
        },
        TableDef {
            name: "agency_metrics",
            depends_on: &["agencies"],
            lifecycle: Lifecycle::FullReload,
        },
        TableDef {
            name: "correction_time_series",
            depends_on: &[],
            lifecycle: Lifecycle::FullReload,
        },
        TableDef {
            name: "cfr_title_stats",
            depends_on: &[],
            lifecycle: Lifecycle::FullReload,
        },
        TableDef {
            name: DATA_CHECKSUMS,
            depends_on: &[],
            lifecycle: Lifecycle::FullReload,
        },
        TableDef {
            name: ETL_LOG,
            depends_on: &[],
            lifecycle: Lifecycle::AppendOnly,
        },
        TableDef {
            name: LOAD_STATE,
            depends_on: &[],
            lifecycle: Lifecycle::RunState,
        },
    ],
    views: &[
        ViewDef {
            name: "v_top_agencies_by_corrections",
            base_table: "agency_metrics",
        },
        ViewDef {
            name: "v_top_agencies_by_rvi",
            base_table: "agency_metrics",
        },
        ViewDef {
            name: "v_yearly_trends",
            base_table: "correction_time_series",
        },
        ViewDef {
            name: "v_recent_corrections",
            base_table: "corrections",
        },
    ],
};

/// Columns written to `etl_log` (id and run_at are server defaults).
pub const ETL_LOG_COLUMNS: [ColumnDef; 5] = [
    ColumnDef::new("source_db", ColumnType::Text),
    ColumnDef::new("records_processed", ColumnType::Int4),
    ColumnDef::new("status", ColumnType::Text),
    ColumnDef::new("error_message", ColumnType::Text),
    ColumnDef::new("duration_seconds", ColumnType::Int4),
];

/// Columns of the run-state marker row.
pub const LOAD_STATE_COLUMNS: [ColumnDef; 3] = [
    ColumnDef::new("state", ColumnType::Text),
    ColumnDef::new("run_id", ColumnType::Text),
    ColumnDef::new("updated_at", ColumnType::Timestamp),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::ENTITIES;

    #[test]
    fn test_every_entity_table_is_full_reload() {
        for entity in ENTITIES {
            let table = TARGET_SCHEMA.table(entity.target_table).unwrap();
            assert_eq!(table.lifecycle, Lifecycle::FullReload, "{}", entity.name);
        }
    }

    #[test]
    fn test_log_and_state_are_not_cleared() {
        let cleared: Vec<_> = TARGET_SCHEMA.full_reload_tables().map(|t| t.name).collect();
        assert!(cleared.contains(&DATA_CHECKSUMS));
        assert!(!cleared.contains(&ETL_LOG));
        assert!(!cleared.contains(&LOAD_STATE));
    }

    #[test]
    fn test_views_draw_from_known_tables() {
        for view in TARGET_SCHEMA.views {
            assert!(TARGET_SCHEMA.table(view.base_table).is_some(), "{}", view.name);
        }
    }
}
