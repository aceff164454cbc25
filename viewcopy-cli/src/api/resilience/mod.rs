//! Retry handling for warehouse API calls
//!
//! BigQuery answers bursts of metadata requests with 429 and transient 5xx
//! responses. Calls are retried with exponential backoff and jitter.

pub mod config;
pub mod retry;

pub use config::RetryConfig;
pub use retry::RetryPolicy;
