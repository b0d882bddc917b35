//! Store implementations.
//!
//! - [`duckdb`]: read-only analytics lake (source)
//! - [`postgres`]: serving database (target)
//! - [`memory`]: in-process store for tests
//! - [`common`]: TLS setup

pub mod common;
pub mod duckdb;
pub mod memory;
pub mod postgres;

pub use self::duckdb::DuckDbSource;
pub use common::{SslMode, TlsBuilder};
pub use memory::{MemoryConnector, MemoryStore};
pub use postgres::PostgresTarget;
