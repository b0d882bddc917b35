//! In-process store used by tests and dry runs.
//!
//! Implements both sides of the pipeline. Transactions snapshot the whole
//! database on `begin`; `rollback` discards the snapshot. Tables pick up
//! columns on first write, and columns never written read back as NULL.
//! A view reads the rows of its base table.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use crate::domain::entity::ColumnDef;
use crate::domain::schema::TargetSchema;
use crate::domain::traits::{RowQuery, RowSink, RowSource, TargetStore};
use crate::domain::value::{Batch, Row, SqlNullType, SqlValue};
use crate::error::{EtlError, Result};
use crate::orchestrator::{Connector, Session};

#[derive(Debug, Clone, Default)]
struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    fn column_index(&mut self, name: &str) -> usize {
        if let Some(idx) = self.columns.iter().position(|c| c == name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(SqlValue::Null(SqlNullType::String));
        }
        self.columns.len() - 1
    }
}

type Tables = BTreeMap<String, Table>;

#[derive(Debug, Default)]
struct State {
    committed: Tables,
    pending: Option<Tables>,
    /// view -> base table
    views: BTreeMap<String, String>,
    /// table -> tables whose foreign keys reference it
    referenced_by: BTreeMap<String, BTreeSet<String>>,
    fk_enforced: bool,
    /// session setting to restore on rollback
    fk_at_begin: bool,
    closed: bool,
    fail_writes: BTreeSet<String>,
    fail_schema: bool,
}

impl State {
    fn tables(&self) -> &Tables {
        self.pending.as_ref().unwrap_or(&self.committed)
    }

    fn tables_mut(&mut self) -> &mut Tables {
        match self.pending {
            Some(ref mut pending) => pending,
            None => &mut self.committed,
        }
    }

    fn resolve(&self, relation: &str) -> Result<&Table> {
        let name = self
            .views
            .get(relation)
            .map(String::as_str)
            .unwrap_or(relation);
        self.tables().get(name).ok_or_else(|| missing(relation))
    }
}

fn missing(relation: &str) -> EtlError {
    EtlError::Schema(format!("relation \"{}\" does not exist", relation))
}

/// In-memory implementation of [`TargetStore`] and [`RowSource`].
pub struct MemoryStore {
    state: Mutex<State>,
    label: String,
}

impl MemoryStore {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(State {
                fk_enforced: true,
                ..State::default()
            }),
            label: label.into(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| EtlError::pool("state mutex poisoned", self.label.clone()))
    }

    /// Create or replace a table with the given contents (committed).
    pub fn put_table(&self, name: &str, columns: &[&str], rows: Vec<Row>) -> Result<()> {
        let mut state = self.lock()?;
        state.committed.insert(
            name.to_string(),
            Table {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
            },
        );
        Ok(())
    }

    /// Make every subsequent write to `table` fail.
    pub fn fail_writes_to(&self, table: &str) -> Result<()> {
        self.lock()?.fail_writes.insert(table.to_string());
        Ok(())
    }

    /// Make every subsequent `apply_schema` fail.
    pub fn fail_schema(&self) -> Result<()> {
        self.lock()?.fail_schema = true;
        Ok(())
    }

    /// Whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.lock().map(|s| s.pending.is_some()).unwrap_or(false)
    }

    /// Whether foreign-key enforcement is on for the session.
    pub fn foreign_keys_enforced(&self) -> bool {
        self.lock().map(|s| s.fk_enforced).unwrap_or(false)
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().map(|s| s.closed).unwrap_or(false)
    }
}

#[async_trait]
impl RowSource for MemoryStore {
    async fn fetch_rows(&self, query: &RowQuery) -> Result<Vec<Row>> {
        let state = self.lock()?;
        let table = state.resolve(&query.relation)?;

        let position = |name: &str| table.columns.iter().position(|c| c == name);
        let order: Vec<Option<usize>> = query.order_by.iter().map(|c| position(c.as_str())).collect();
        let projection: Vec<Option<usize>> = query.columns.iter().map(|c| position(c.as_str())).collect();

        let mut rows: Vec<&Row> = table.rows.iter().collect();
        rows.sort_by(|a, b| {
            order
                .iter()
                .flatten()
                .map(|&idx| a[idx].sort_cmp(&b[idx]))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(rows
            .into_iter()
            .map(|row| {
                projection
                    .iter()
                    .map(|idx| match idx {
                        Some(i) => row[*i].clone(),
                        None => SqlValue::Null(SqlNullType::String),
                    })
                    .collect()
            })
            .collect())
    }

    async fn count_rows(&self, relation: &str) -> Result<i64> {
        let state = self.lock()?;
        Ok(state.resolve(relation)?.rows.len() as i64)
    }

    fn describe(&self) -> String {
        format!("memory://{}", self.label)
    }

    async fn close(&self) {
        if let Ok(mut state) = self.lock() {
            state.pending = None;
            state.closed = true;
        }
    }
}

#[async_trait]
impl RowSink for MemoryStore {
    async fn write_batch(&self, table: &str, columns: &[ColumnDef], batch: Batch) -> Result<u64> {
        let mut state = self.lock()?;
        if state.fail_writes.contains(table) {
            return Err(EtlError::Io(std::io::Error::other(format!(
                "write to {} rejected",
                table
            ))));
        }

        let target = state
            .tables_mut()
            .get_mut(table)
            .ok_or_else(|| missing(table))?;
        let indices: Vec<usize> = columns.iter().map(|c| target.column_index(c.name)).collect();
        let width = target.columns.len();

        let written = batch.len() as u64;
        for values in batch.rows {
            let mut row = vec![SqlValue::Null(SqlNullType::String); width];
            for (idx, value) in indices.iter().zip(values) {
                row[*idx] = value;
            }
            target.rows.push(row);
        }
        Ok(written)
    }
}

#[async_trait]
impl TargetStore for MemoryStore {
    async fn begin(&self) -> Result<()> {
        let mut state = self.lock()?;
        if state.pending.is_none() {
            state.pending = Some(state.committed.clone());
            state.fk_at_begin = state.fk_enforced;
        }
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(pending) = state.pending.take() {
            state.committed = pending;
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut state = self.lock()?;
        if state.pending.take().is_some() {
            state.fk_enforced = state.fk_at_begin;
            debug!("{}: rolled back", self.label);
        }
        Ok(())
    }

    async fn apply_schema(&self, schema: &TargetSchema) -> Result<()> {
        let mut state = self.lock()?;
        if state.fail_schema {
            return Err(EtlError::Io(std::io::Error::other("schema change rejected")));
        }
        for table in schema.tables {
            state
                .tables_mut()
                .entry(table.name.to_string())
                .or_default();
            for dep in table.depends_on.iter().filter(|d| **d != table.name) {
                state
                    .referenced_by
                    .entry(dep.to_string())
                    .or_default()
                    .insert(table.name.to_string());
            }
        }
        for view in schema.views {
            state
                .views
                .insert(view.name.to_string(), view.base_table.to_string());
        }
        Ok(())
    }

    async fn set_foreign_key_enforcement(&self, enabled: bool) -> Result<()> {
        self.lock()?.fk_enforced = enabled;
        Ok(())
    }

    async fn truncate(&self, table: &str) -> Result<()> {
        let mut state = self.lock()?;
        let mut queue = vec![table.to_string()];
        let mut seen = BTreeSet::new();
        while let Some(name) = queue.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            state
                .tables_mut()
                .get_mut(&name)
                .ok_or_else(|| missing(&name))?
                .rows
                .clear();
            if let Some(dependents) = state.referenced_by.get(&name) {
                queue.extend(dependents.iter().cloned());
            }
        }
        Ok(())
    }
}

/// Hands out sessions over a pair of shared memory stores.
#[derive(Clone)]
pub struct MemoryConnector {
    pub source: Arc<MemoryStore>,
    pub target: Arc<MemoryStore>,
}

impl MemoryConnector {
    pub fn new(source: Arc<MemoryStore>, target: Arc<MemoryStore>) -> Self {
        Self { source, target }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Session> {
        Ok(Session::new(self.source.clone(), self.target.clone()))
    }

    fn source_label(&self) -> String {
        self.source.describe()
    }
}
