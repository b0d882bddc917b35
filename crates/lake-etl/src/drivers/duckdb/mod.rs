//! DuckDB source store.
//!
//! The database file is opened read-only. DuckDB's API is synchronous, so
//! every call runs on the blocking pool with the connection behind a mutex.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use duckdb::types::{TimeUnit, Value};
use duckdb::{AccessMode, Connection};
use tracing::{debug, info};

use crate::domain::traits::{quote_ident, RowQuery, RowSource};
use crate::domain::value::{Row, SqlNullType, SqlValue};
use crate::error::{EtlError, Result};

/// Days from 0001-01-01 (CE day 1) to 1970-01-01.
const UNIX_EPOCH_CE_DAYS: i32 = 719_163;

/// Read-only DuckDB implementation of [`RowSource`].
pub struct DuckDbSource {
    conn: Arc<Mutex<Option<Connection>>>,
    path: PathBuf,
}

impl DuckDbSource {
    /// Open the database file read-only. A missing file is a connection error.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(EtlError::connection(
                "duckdb",
                format!("database file not found: {}", path.display()),
            ));
        }

        let config = duckdb::Config::default()
            .access_mode(AccessMode::ReadOnly)
            .map_err(|e| EtlError::connection("duckdb", e))?;
        let conn = Connection::open_with_flags(path, config)
            .map_err(|e| EtlError::connection("duckdb", e))?;

        info!("Connected to DuckDB source: {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            path: path.to_path_buf(),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| EtlError::pool("connection mutex poisoned", "duckdb"))?;
            let conn = guard
                .as_ref()
                .ok_or_else(|| EtlError::pool("connection already closed", "duckdb"))?;
            f(conn)
        })
        .await
        .map_err(|e| EtlError::pool(e, "duckdb blocking task"))?
    }
}

#[async_trait]
impl RowSource for DuckDbSource {
    async fn fetch_rows(&self, query: &RowQuery) -> Result<Vec<Row>> {
        let sql = query.to_sql();
        let width = query.columns.len();
        debug!("{}", sql);

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(width);
                for idx in 0..width {
                    let value: Value = row.get(idx)?;
                    values.push(convert_value(value)?);
                }
                out.push(values);
            }
            Ok(out)
        })
        .await
    }

    async fn count_rows(&self, relation: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(relation));
        self.with_conn(move |conn| Ok(conn.query_row(&sql, [], |row| row.get::<_, i64>(0))?))
            .await
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn close(&self) {
        if let Ok(mut guard) = self.conn.lock() {
            if guard.take().is_some() {
                debug!("Closed DuckDB connection");
            }
        }
    }
}

/// Convert a DuckDB value to the shared representation.
fn convert_value(value: Value) -> Result<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null(SqlNullType::String),
        Value::Boolean(b) => SqlValue::Bool(b),
        Value::TinyInt(v) => SqlValue::I32(i32::from(v)),
        Value::SmallInt(v) => SqlValue::I32(i32::from(v)),
        Value::Int(v) => SqlValue::I32(v),
        Value::BigInt(v) => SqlValue::I64(v),
        Value::UTinyInt(v) => SqlValue::I32(i32::from(v)),
        Value::USmallInt(v) => SqlValue::I32(i32::from(v)),
        Value::UInt(v) => SqlValue::I64(i64::from(v)),
        Value::UBigInt(v) => match i64::try_from(v) {
            Ok(v) => SqlValue::I64(v),
            Err(_) => SqlValue::Text(v.to_string()),
        },
        Value::HugeInt(v) => match i64::try_from(v) {
            Ok(v) => SqlValue::I64(v),
            Err(_) => SqlValue::Text(v.to_string()),
        },
        Value::Float(v) => SqlValue::F64(f64::from(v)),
        Value::Double(v) => SqlValue::F64(v),
        Value::Decimal(d) => SqlValue::Decimal(d),
        Value::Text(s) => SqlValue::Text(s),
        Value::Enum(s) => SqlValue::Text(s),
        Value::Blob(b) => SqlValue::Bytes(b),
        Value::Date32(days) => NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_CE_DAYS)
            .map(SqlValue::Date)
            .ok_or_else(|| unsupported(format!("date out of range: {} days", days)))?,
        Value::Timestamp(unit, raw) => DateTime::from_timestamp_micros(to_micros(unit, raw))
            .map(|dt| SqlValue::DateTime(dt.naive_utc()))
            .ok_or_else(|| unsupported(format!("timestamp out of range: {}", raw)))?,
        other => return Err(unsupported(format!("unsupported DuckDB value {:?}", other))),
    })
}

fn to_micros(unit: TimeUnit, raw: i64) -> i64 {
    match unit {
        TimeUnit::Second => raw.saturating_mul(1_000_000),
        TimeUnit::Millisecond => raw.saturating_mul(1_000),
        TimeUnit::Microsecond => raw,
        TimeUnit::Nanosecond => raw / 1_000,
    }
}

fn unsupported(message: String) -> EtlError {
    EtlError::Config(format!("source value: {}", message))
}
