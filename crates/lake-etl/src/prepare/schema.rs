use tracing::{info, warn};

use crate::domain::schema::TargetSchema;
use crate::domain::traits::TargetStore;
use crate::error::{EtlError, Result};

/// Ensures the target tables and views exist.
pub struct SchemaInitializer<'a> {
    schema: &'a TargetSchema,
}

impl<'a> SchemaInitializer<'a> {
    pub fn new(schema: &'a TargetSchema) -> Self {
        Self { schema }
    }

    /// Apply the schema in its own transaction. Idempotent.
    pub async fn initialize(&self, target: &dyn TargetStore) -> Result<()> {
        info!("Initializing target schema");

        target.begin().await?;
        if let Err(e) = target.apply_schema(self.schema).await {
            if let Err(rb) = target.rollback().await {
                warn!("Rollback of schema initialization failed: {}", rb);
            }
            return Err(match e {
                EtlError::Schema(_) => e,
                other => EtlError::Schema(other.to_string()),
            });
        }
        target.commit().await.map_err(|e| EtlError::Schema(e.to_string()))?;

        info!(
            "Target schema ready ({} tables, {} views)",
            self.schema.tables.len(),
            self.schema.views.len()
        );
        Ok(())
    }
}
