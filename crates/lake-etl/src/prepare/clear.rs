use tracing::{debug, info, warn};

use crate::domain::graph::clearing_order;
use crate::domain::schema::{TableDef, TargetSchema};
use crate::domain::traits::TargetStore;
use crate::error::{EtlError, Result};

/// Empties every full-reload table before a load.
pub struct DataClearer {
    order: Vec<&'static str>,
}

impl DataClearer {
    /// Compute the clearing order from the schema's dependency graph.
    pub fn new(schema: &'static TargetSchema) -> Result<Self> {
        let tables: Vec<&'static TableDef> = schema.full_reload_tables().collect();
        Ok(Self {
            order: clearing_order(&tables)?,
        })
    }

    /// Tables in the order they are emptied.
    pub fn order(&self) -> &[&'static str] {
        &self.order
    }

    /// Truncate every table in one transaction with FK enforcement suspended.
    pub async fn clear(&self, target: &dyn TargetStore) -> Result<()> {
        info!("Clearing {} target tables", self.order.len());

        target
            .begin()
            .await
            .map_err(|e| EtlError::clear("(transaction)", e))?;
        if let Err(e) = self.clear_in_transaction(target).await {
            if let Err(rb) = target.rollback().await {
                warn!("Rollback after failed clear also failed: {}", rb);
            }
            // rollback also restores session_replication_role
            return Err(e);
        }
        target
            .commit()
            .await
            .map_err(|e| EtlError::clear("(transaction)", e))?;

        info!("Target tables cleared");
        Ok(())
    }

    async fn clear_in_transaction(&self, target: &dyn TargetStore) -> Result<()> {
        target
            .set_foreign_key_enforcement(false)
            .await
            .map_err(|e| EtlError::clear("(foreign keys)", e))?;

        for table in &self.order {
            target
                .truncate(table)
                .await
                .map_err(|e| EtlError::clear(*table, e))?;
            debug!("Cleared {}", table);
        }

        target
            .set_foreign_key_enforcement(true)
            .await
            .map_err(|e| EtlError::clear("(foreign keys)", e))
    }
}
