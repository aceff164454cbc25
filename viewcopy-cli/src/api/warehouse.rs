//! Warehouse interface used by the migration
//!
//! The migration only needs four metadata operations. Keeping them behind a
//! trait lets the runner work against the BigQuery REST client in production
//! and an in-memory double in tests.

use anyhow::Result;
use async_trait::async_trait;

use super::models::{DatasetRef, Lookup, TableDefinition, TableListing, TableRef};

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// List every table in a dataset, in the order the service returns them
    async fn list_tables(&self, dataset: &DatasetRef) -> Result<Vec<TableListing>>;

    /// Fetch a single table; a missing table is `Lookup::NotFound`, not an error
    async fn get_table(&self, table: &TableRef) -> Result<Lookup<TableDefinition>>;

    /// Create a view, failing if something already exists under that name
    async fn create_view(&self, table: &TableRef, query: &str) -> Result<()>;

    /// Create a view or overwrite the existing definition
    async fn create_or_replace_view(&self, table: &TableRef, query: &str) -> Result<()>;
}

/// Error returned by the warehouse API
#[derive(Debug, Clone)]
pub enum ApiError {
    /// The service answered with a non-success status
    Status {
        status: u16,
        message: String,
    },
    /// The target already exists (create without replace)
    AlreadyExists(String),
    /// The response body could not be understood
    InvalidResponse(String),
}

impl ApiError {
    /// Whether repeating the request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Status { status, .. } => *status == 429 || *status >= 500,
            ApiError::AlreadyExists(_) | ApiError::InvalidResponse(_) => false,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Status { status, message } => {
                write!(f, "warehouse API returned HTTP {}: {}", status, message)
            }
            ApiError::AlreadyExists(name) => write!(f, "{} already exists", name),
            ApiError::InvalidResponse(msg) => write!(f, "invalid API response: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}
