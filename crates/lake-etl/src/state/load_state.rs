use chrono::Utc;
use tracing::{info, warn};

use super::{load_state_to_str, str_to_load_state, LoadState};
use crate::domain::schema::{LOAD_STATE, LOAD_STATE_COLUMNS};
use crate::domain::traits::{RowQuery, TargetStore};
use crate::domain::value::{Batch, SqlValue};
use crate::error::{EtlError, Result};

/// Rewrites the single `etl_load_state` row for one run.
#[derive(Debug, Clone)]
pub struct LoadStateMarker {
    run_id: String,
}

impl LoadStateMarker {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }

    /// Replace the marker row in its own transaction.
    pub async fn mark(&self, target: &dyn TargetStore, state: LoadState) -> Result<()> {
        let row = vec![
            SqlValue::from(load_state_to_str(state)),
            SqlValue::from(self.run_id.as_str()),
            SqlValue::DateTime(Utc::now().naive_utc()),
        ];

        target.begin().await?;
        if let Err(e) = self.replace(target, row).await {
            if let Err(rb) = target.rollback().await {
                warn!("Rollback of load state failed: {}", rb);
            }
            return Err(e);
        }
        target.commit().await?;

        info!("Load state: {}", load_state_to_str(state));
        Ok(())
    }

    async fn replace(&self, target: &dyn TargetStore, row: Vec<SqlValue>) -> Result<()> {
        target.truncate(LOAD_STATE).await?;
        target
            .write_batch(LOAD_STATE, &LOAD_STATE_COLUMNS, Batch::new(vec![row]))
            .await?;
        Ok(())
    }

    /// Read the current marker, if any run has written one.
    pub async fn current(target: &dyn TargetStore) -> Result<Option<(LoadState, String)>> {
        let rows = target
            .fetch_rows(&RowQuery::new(LOAD_STATE, &["state", "run_id"]))
            .await?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        let state = row[0]
            .as_str()
            .ok_or_else(|| EtlError::Schema(format!("{}.state is not text", LOAD_STATE)))?;
        let run_id = row[1].as_str().unwrap_or_default().to_string();
        Ok(Some((str_to_load_state(state)?, run_id)))
    }
}
