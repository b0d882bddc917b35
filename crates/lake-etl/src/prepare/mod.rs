//! Target preparation: schema creation and clearing of full-reload tables.

mod clear;
mod schema;

pub use clear::DataClearer;
pub use schema::SchemaInitializer;
