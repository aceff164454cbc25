//! Warehouse API module
//!
//! Exposes the [`Warehouse`] interface the migration talks to, the BigQuery
//! REST client implementing it, and the metadata models shared by both.

pub mod bigquery;
#[cfg(test)]
pub mod memory;
pub mod models;
pub mod resilience;
pub mod warehouse;

pub use bigquery::BigQueryClient;
pub use models::{DatasetRef, Lookup, TableRef};
pub use resilience::RetryConfig;
pub use warehouse::Warehouse;
