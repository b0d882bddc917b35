use std::time::Instant;

use tracing::{debug, warn};

use super::{run_status_to_str, RunStatus};
use crate::domain::schema::{ETL_LOG, ETL_LOG_COLUMNS};
use crate::domain::traits::TargetStore;
use crate::domain::value::{Batch, SqlNullType, SqlValue};
use crate::error::Result;

/// Appends one `etl_log` row per execution.
#[derive(Debug, Clone)]
pub struct RunLogger {
    started: Instant,
    source_db: String,
}

impl RunLogger {
    /// Start the run clock.
    pub fn start(source_db: impl Into<String>) -> Self {
        Self {
            started: Instant::now(),
            source_db: source_db.into(),
        }
    }

    /// Whole seconds since [`RunLogger::start`].
    pub fn elapsed_secs(&self) -> i32 {
        i32::try_from(self.started.elapsed().as_secs()).unwrap_or(i32::MAX)
    }

    /// Append the run record in its own transaction.
    pub async fn log(
        &self,
        target: &dyn TargetStore,
        records_processed: u64,
        status: RunStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let records = i32::try_from(records_processed).unwrap_or(i32::MAX);
        let row = vec![
            SqlValue::from(self.source_db.as_str()),
            SqlValue::I32(records),
            SqlValue::from(run_status_to_str(status)),
            error_message
                .map(SqlValue::from)
                .unwrap_or(SqlValue::Null(SqlNullType::String)),
            SqlValue::I32(self.elapsed_secs()),
        ];

        target.begin().await?;
        let written = target
            .write_batch(ETL_LOG, &ETL_LOG_COLUMNS, Batch::new(vec![row]))
            .await;
        if let Err(e) = written {
            if let Err(rb) = target.rollback().await {
                warn!("Rollback of run log failed: {}", rb);
            }
            return Err(e);
        }
        target.commit().await?;

        debug!(
            "Logged run: status={}, records={}",
            run_status_to_str(status),
            records
        );
        Ok(())
    }
}
