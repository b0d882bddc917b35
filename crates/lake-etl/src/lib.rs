//! # lake-etl
//!
//! Full-reload ETL from a DuckDB analytics lake into a PostgreSQL serving
//! database, with a post-load verifier.
//!
//! A run:
//!
//! - **Prepares** the target: idempotent schema, then every full-reload table
//!   emptied in dependency order
//! - **Transfers** five entities in batches, one transaction per entity
//! - **Verifies** the result with six independent consistency checks
//! - **Logs** one `etl_log` row, on success and on failure
//!
//! ## Example
//!
//! ```rust,no_run
//! use lake_etl::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> lake_etl::Result<()> {
//!     let config = Config::from_env()?;
//!     let report = Orchestrator::new(config).run().await?;
//!     println!("Loaded {} records", report.records_processed);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod domain;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod prepare;
pub mod state;
pub mod transfer;
pub mod verify;

// Re-exports for convenient access
pub use config::{Config, EtlConfig, SourceConfig, TargetConfig};
pub use domain::{EntitySpec, RowSource, SqlValue, TargetStore, ENTITIES, TARGET_SCHEMA};
pub use drivers::{MemoryConnector, MemoryStore};
pub use error::{EtlError, Result};
pub use orchestrator::{Connector, Orchestrator, RunPhase, RunReport, Session};
pub use state::{LoadState, LoadStateMarker, RunStatus};
pub use transfer::{TransferEngine, TransferStats};
pub use verify::{CheckKind, CheckResult, Verifier, VerifyReport};
