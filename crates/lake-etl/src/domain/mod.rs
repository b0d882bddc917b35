//! Core abstractions shared by every store and stage.
//!
//! - [`value`]: owned SQL values and batches
//! - [`entity`]: the five transferred entities and their column mappings
//! - [`schema`]: target table and view catalog
//! - [`graph`]: dependency ordering of target tables
//! - [`traits`]: store capabilities implemented by the drivers

pub mod entity;
pub mod graph;
pub mod schema;
pub mod traits;
pub mod value;

pub use entity::{ColumnDef, ColumnType, EntitySpec, ENTITIES};
pub use schema::{Lifecycle, TableDef, TargetSchema, ViewDef, TARGET_SCHEMA};
pub use traits::{quote_ident, RowQuery, RowSink, RowSource, TargetStore};
pub use value::{Batch, Row, SqlNullType, SqlValue};
