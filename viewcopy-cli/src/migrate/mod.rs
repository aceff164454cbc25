//! View migration between datasets
//!
//! Views are read from the source dataset, ordered so that every view is
//! created after the views it selects from, rewritten to point at the
//! destination, and created there. A DDL script with one statement per
//! processed view is written alongside.

pub mod dependency_graph;
pub mod fetch;
pub mod materialize;
pub mod references;
pub mod report;
pub mod rewrite;
pub mod runner;
pub mod types;

pub use materialize::{CreationPolicy, ViewOutcome};
pub use report::MigrationReport;
pub use runner::{MigrationPlan, MigrationRunner};
