use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::Config;
use crate::domain::traits::{RowSource, TargetStore};
use crate::drivers::{DuckDbSource, PostgresTarget};
use crate::error::Result;

/// Both store handles for one run.
pub struct Session {
    pub source: Arc<dyn RowSource>,
    pub target: Arc<dyn TargetStore>,
}

impl Session {
    pub fn new(source: Arc<dyn RowSource>, target: Arc<dyn TargetStore>) -> Self {
        Self { source, target }
    }

    /// Release both connections.
    pub async fn close(&self) {
        self.target.close().await;
        self.source.close().await;
        debug!("Session closed");
    }
}

/// Opens sessions against a pair of stores.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Session>;

    /// Identifier recorded in `etl_log.source_db`.
    fn source_label(&self) -> String;
}

/// Connects to the configured DuckDB file and PostgreSQL server.
pub struct StoreConnector {
    config: Config,
}

impl StoreConnector {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for StoreConnector {
    async fn connect(&self) -> Result<Session> {
        let source = DuckDbSource::open(&self.config.source.path)?;
        let target = match PostgresTarget::connect(&self.config.target).await {
            Ok(target) => target,
            Err(e) => {
                source.close().await;
                return Err(e);
            }
        };
        Ok(Session::new(Arc::new(source), Arc::new(target)))
    }

    fn source_label(&self) -> String {
        self.config.source.source_label()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlError;

    #[tokio::test]
    async fn test_missing_duckdb_file_is_connection_error() {
        let mut config = Config::default();
        config.source.path = "/nonexistent/lake.duckdb".into();

        let connector = StoreConnector::new(config);
        assert_eq!(connector.source_label(), "/nonexistent/lake.duckdb");
        let err = connector.connect().await.err().unwrap();
        assert!(matches!(err, EtlError::Connection { .. }));
        assert_eq!(err.exit_code(), 3);
    }
}
