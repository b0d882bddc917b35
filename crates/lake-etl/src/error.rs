//! Error types for the ETL library.

use thiserror::Error;

/// Main error type for ETL operations.
#[derive(Error, Debug)]
pub enum EtlError {
    /// Configuration error (invalid YAML, bad connection string, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A store could not be reached when the session was opened
    #[error("Connection to {store} failed: {message}")]
    Connection { store: String, message: String },

    /// Target schema creation failed
    #[error("Schema initialization failed: {0}")]
    Schema(String),

    /// Emptying a target table failed
    #[error("Clearing table {table} failed: {message}")]
    Clear { table: String, message: String },

    /// Extraction, transform or batch write failed for an entity
    #[error("Transfer failed for {entity}: {message}")]
    Transfer { entity: String, message: String },

    /// One or more post-load checks did not pass
    #[error("Verification failed: {failed} of {total} checks did not pass")]
    Verification { failed: usize, total: usize },

    /// Source (DuckDB) query error
    #[error("Source database error: {0}")]
    Source(#[from] duckdb::Error),

    /// Target (PostgreSQL) query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EtlError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        EtlError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Connection error for the named store
    pub fn connection(store: impl Into<String>, message: impl std::fmt::Display) -> Self {
        EtlError::Connection {
            store: store.into(),
            message: message.to_string(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(entity: impl Into<String>, message: impl std::fmt::Display) -> Self {
        EtlError::Transfer {
            entity: entity.into(),
            message: message.to_string(),
        }
    }

    /// Create a Clear error
    pub fn clear(table: impl Into<String>, message: impl std::fmt::Display) -> Self {
        EtlError::Clear {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Process exit code for this error.
    ///
    /// Verification failures use 1 so that `verify` can be scripted as a plain
    /// pass/fail gate; everything else is distinguishable by class.
    pub fn exit_code(&self) -> u8 {
        match self {
            EtlError::Verification { .. } => 1,
            EtlError::Config(_) | EtlError::Yaml(_) => 2,
            EtlError::Connection { .. } | EtlError::Pool { .. } => 3,
            EtlError::Schema(_) | EtlError::Clear { .. } | EtlError::Transfer { .. } => 4,
            _ => 5,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for ETL operations.
pub type Result<T> = std::result::Result<T, EtlError>;
