//! Store capabilities used by the pipeline.
//!
//! - [`RowSource`]: ordered row extraction and counts (both stores)
//! - [`RowSink`]: batched inserts (target)
//! - [`TargetStore`]: transactions, DDL, truncation and FK toggling (target)

use async_trait::async_trait;

use crate::error::Result;

use super::entity::ColumnDef;
use super::schema::TargetSchema;
use super::value::{Batch, Row};

/// A full, ordered read of some columns of a relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowQuery {
    /// Table or view name.
    pub relation: String,
    /// Columns to read, in output order.
    pub columns: Vec<String>,
    /// Ordering key, most significant first.
    pub order_by: Vec<String>,
}

impl RowQuery {
    /// Read `columns` from `relation` in storage order.
    pub fn new(relation: &str, columns: &[&str]) -> Self {
        Self {
            relation: relation.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            order_by: Vec::new(),
        }
    }

    /// Set the ordering key.
    pub fn ordered_by(mut self, columns: &[&str]) -> Self {
        self.order_by = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Render as a SELECT statement with quoted identifiers.
    pub fn to_sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("SELECT {} FROM {}", columns, quote_ident(&self.relation));
        if !self.order_by.is_empty() {
            let order = self
                .order_by
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(" ORDER BY ");
            sql.push_str(&order);
        }
        sql
    }
}

/// Quote an identifier for DuckDB and PostgreSQL (both use double quotes).
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Read rows from a store.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Fetch every row of the query, in order.
    async fn fetch_rows(&self, query: &RowQuery) -> Result<Vec<Row>>;

    /// Count the rows of a table or view.
    async fn count_rows(&self, relation: &str) -> Result<i64>;

    /// Human-readable store identifier for logs (never includes credentials).
    fn describe(&self) -> String;

    /// Release the underlying connection.
    async fn close(&self);
}

/// Write batches of rows to a store.
#[async_trait]
pub trait RowSink: Send + Sync {
    /// Insert one batch in a single round trip. Returns rows written.
    async fn write_batch(&self, table: &str, columns: &[ColumnDef], batch: Batch) -> Result<u64>;
}

/// A writable target with explicit transaction control.
///
/// Transactions are session-scoped: `begin` opens one on the store's single
/// connection, and every subsequent call runs inside it until `commit` or
/// `rollback`.
#[async_trait]
pub trait TargetStore: RowSource + RowSink {
    async fn begin(&self) -> Result<()>;

    async fn commit(&self) -> Result<()>;

    /// Roll back the open transaction. A no-op when none is open.
    async fn rollback(&self) -> Result<()>;

    /// Create missing tables and (re)create views.
    async fn apply_schema(&self, schema: &TargetSchema) -> Result<()>;

    /// Enable or disable foreign-key enforcement for this session.
    async fn set_foreign_key_enforcement(&self, enabled: bool) -> Result<()>;

    /// Empty a table, restart its identity sequence and cascade to dependents.
    async fn truncate(&self, table: &str) -> Result<()>;
}
