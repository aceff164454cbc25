//! Summary of a migration run

use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::PathBuf;

use super::materialize::{CreationPolicy, ViewOutcome};
use crate::api::DatasetRef;

/// One scheduled view and what happened to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedView {
    pub name: String,
    pub outcome: ViewOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub started_at: DateTime<Local>,
    pub source: DatasetRef,
    pub destination: DatasetRef,
    pub policy: CreationPolicy,
    pub execute: bool,
    /// Views listed at the source, in listing order
    pub view_names: Vec<String>,
    /// Listed views whose definition could not be fetched
    pub unavailable: Vec<String>,
    /// Creation order computed from the dependency graph
    pub order: Vec<String>,
    pub cyclic: Vec<String>,
    pub blocked: Vec<String>,
    /// Views in the order they were processed
    pub processed: Vec<ProcessedView>,
    /// Warning diagnostics raised during the run
    pub warnings: Vec<String>,
    pub ddl_path: PathBuf,
    pub ddl_statements: usize,
}

/// Outcome counts for the summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub created: usize,
    pub replaced: usize,
    pub skipped_existing: usize,
    pub dry_run: usize,
    pub failed: usize,
    pub missing_query: usize,
}

impl MigrationReport {
    pub fn new(
        source: DatasetRef,
        destination: DatasetRef,
        policy: CreationPolicy,
        execute: bool,
        ddl_path: PathBuf,
    ) -> Self {
        Self {
            started_at: Local::now(),
            source,
            destination,
            policy,
            execute,
            view_names: Vec::new(),
            unavailable: Vec::new(),
            order: Vec::new(),
            cyclic: Vec::new(),
            blocked: Vec::new(),
            processed: Vec::new(),
            warnings: Vec::new(),
            ddl_path,
            ddl_statements: 0,
        }
    }

    pub fn record(&mut self, name: &str, outcome: ViewOutcome) {
        self.processed.push(ProcessedView {
            name: name.to_string(),
            outcome,
        });
    }

    #[cfg(test)]
    pub fn outcome_of(&self, name: &str) -> Option<&ViewOutcome> {
        self.processed
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.outcome)
    }

    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for processed in &self.processed {
            match processed.outcome {
                ViewOutcome::Created => counts.created += 1,
                ViewOutcome::Replaced => counts.replaced += 1,
                ViewOutcome::SkippedExisting => counts.skipped_existing += 1,
                ViewOutcome::DryRun => counts.dry_run += 1,
                ViewOutcome::Failed(_) => counts.failed += 1,
                ViewOutcome::MissingQuery => counts.missing_query += 1,
            }
        }
        counts
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProcessedView> {
        self.processed.iter().filter(|p| p.outcome.is_failure())
    }

    pub fn has_problems(&self) -> bool {
        !self.warnings.is_empty() || self.failures().next().is_some()
    }
}
