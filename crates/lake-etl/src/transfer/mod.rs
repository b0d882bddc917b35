//! Per-entity transfer: ordered extract, column mapping, batched insert.
//!
//! Each entity is written inside its own transaction and committed once.
//! Any failure rolls that transaction back and aborts with a `Transfer` error.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::entity::EntitySpec;
use crate::domain::traits::{RowSource, TargetStore};
use crate::domain::value::{Batch, Row};
use crate::error::{EtlError, Result};

/// Outcome of one entity transfer.
#[derive(Debug, Clone, Serialize)]
pub struct TransferStats {
    pub entity: String,
    pub rows_read: u64,
    pub rows_written: u64,
    pub batches: usize,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

/// Moves entities from a source to a target in fixed-size batches.
pub struct TransferEngine<'a> {
    source: &'a dyn RowSource,
    target: &'a dyn TargetStore,
    batch_size: usize,
}

impl<'a> TransferEngine<'a> {
    pub fn new(source: &'a dyn RowSource, target: &'a dyn TargetStore, batch_size: usize) -> Self {
        Self {
            source,
            target,
            batch_size: batch_size.max(1),
        }
    }

    /// Transfer one entity. Returns the committed row count.
    pub async fn transfer(&self, entity: &EntitySpec) -> Result<TransferStats> {
        let started = Instant::now();
        info!(
            "Transferring {} ({} -> {})",
            entity.name, entity.source_relation, entity.target_table
        );

        let rows = self.extract(entity).await?;
        let rows_read = rows.len() as u64;

        self.target
            .begin()
            .await
            .map_err(|e| EtlError::transfer(entity.name, e))?;

        let (rows_written, batches) = match self.load(entity, rows).await {
            Ok(counts) => counts,
            Err(e) => {
                if let Err(rb) = self.target.rollback().await {
                    warn!("{}: rollback failed: {}", entity.name, rb);
                }
                return Err(e);
            }
        };

        if rows_written != rows_read {
            if let Err(rb) = self.target.rollback().await {
                warn!("{}: rollback failed: {}", entity.name, rb);
            }
            return Err(EtlError::transfer(
                entity.name,
                format!("read {} rows but wrote {}", rows_read, rows_written),
            ));
        }

        self.target
            .commit()
            .await
            .map_err(|e| EtlError::transfer(entity.name, e))?;

        let stats = TransferStats {
            entity: entity.name.to_string(),
            rows_read,
            rows_written,
            batches,
            duration: started.elapsed(),
        };
        info!(
            "Transferred {} {} in {:.2}s",
            stats.rows_written,
            entity.name,
            stats.duration.as_secs_f64()
        );
        Ok(stats)
    }

    async fn extract(&self, entity: &EntitySpec) -> Result<Vec<Row>> {
        let raw = self
            .source
            .fetch_rows(&entity.source_query())
            .await
            .map_err(|e| EtlError::transfer(entity.name, e))?;

        raw.into_iter()
            .enumerate()
            .map(|(idx, row)| {
                entity
                    .map_row(row)
                    .map_err(|e| EtlError::transfer(entity.name, format!("row {}: {}", idx + 1, e)))
            })
            .collect()
    }

    async fn load(&self, entity: &EntitySpec, rows: Vec<Row>) -> Result<(u64, usize)> {
        let columns = entity.target_columns();
        let mut rows = rows.into_iter();
        let mut written = 0u64;
        let mut batches = 0usize;

        loop {
            let chunk: Vec<Row> = rows.by_ref().take(self.batch_size).collect();
            if chunk.is_empty() {
                break;
            }
            let n = self
                .target
                .write_batch(entity.target_table, &columns, Batch::new(chunk))
                .await
                .map_err(|e| {
                    EtlError::transfer(entity.name, format!("batch {}: {}", batches + 1, e))
                })?;
            written += n;
            batches += 1;
            debug!("{}: batch {} wrote {} rows", entity.name, batches, n);
        }

        Ok((written, batches))
    }
}

pub(crate) mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}
