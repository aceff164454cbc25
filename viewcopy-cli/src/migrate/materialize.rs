//! Creates views at the destination and records the DDL script

use anyhow::{Context, Result};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::api::{DatasetRef, Lookup, TableRef, Warehouse};

/// What to do when a view already exists at the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CreationPolicy {
    /// Leave existing views untouched (default)
    #[default]
    SkipExisting,
    /// Always create-or-replace
    Replace,
}

impl CreationPolicy {
    pub fn from_replace_flag(replace_existing: bool) -> Self {
        if replace_existing {
            CreationPolicy::Replace
        } else {
            CreationPolicy::SkipExisting
        }
    }
}

/// Result of processing one scheduled view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ViewOutcome {
    Created,
    Replaced,
    SkippedExisting,
    /// Creation was not attempted because the run is a dry run
    DryRun,
    Failed(String),
    /// The view was scheduled but no definition was fetched for it
    MissingQuery,
}

impl ViewOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ViewOutcome::Created => "created",
            ViewOutcome::Replaced => "created or replaced",
            ViewOutcome::SkippedExisting => "already exists",
            ViewOutcome::DryRun => "dry run",
            ViewOutcome::Failed(_) => "failed",
            ViewOutcome::MissingQuery => "no query",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ViewOutcome::Failed(_))
    }
}

/// Applies rewritten view definitions to the destination dataset
pub struct Materializer<'a> {
    warehouse: &'a dyn Warehouse,
    destination: DatasetRef,
    policy: CreationPolicy,
    execute: bool,
}

impl<'a> Materializer<'a> {
    pub fn new(
        warehouse: &'a dyn Warehouse,
        destination: DatasetRef,
        policy: CreationPolicy,
        execute: bool,
    ) -> Self {
        Self {
            warehouse,
            destination,
            policy,
            execute,
        }
    }

    pub fn target(&self, view: &str) -> TableRef {
        self.destination.table(view)
    }

    /// Create one view according to the policy. Failures are logged and
    /// returned as an outcome, never as an error.
    pub async fn materialize(&self, view: &str, query: &str) -> ViewOutcome {
        let target = self.target(view);

        match self.policy {
            CreationPolicy::Replace => {
                if !self.execute {
                    info!("DDL for view {} would be executed (not actually creating).", view);
                    return ViewOutcome::DryRun;
                }
                match self.warehouse.create_or_replace_view(&target, query).await {
                    Ok(()) => {
                        info!("Successfully created or replaced view {}", view);
                        ViewOutcome::Replaced
                    }
                    Err(e) => {
                        error!("Failed to create or replace view {}. Error: {:#}", view, e);
                        ViewOutcome::Failed(format!("{:#}", e))
                    }
                }
            }
            CreationPolicy::SkipExisting => {
                match self.warehouse.get_table(&target).await {
                    Ok(Lookup::Found(_)) => {
                        info!("View {} already exists. Skipping creation.", view);
                        return ViewOutcome::SkippedExisting;
                    }
                    Ok(Lookup::NotFound) => {}
                    Err(e) => {
                        error!("Could not check whether {} exists. Error: {:#}", target, e);
                        return ViewOutcome::Failed(format!("existence check failed: {:#}", e));
                    }
                }

                if !self.execute {
                    info!("DDL for view {} would be executed (not actually creating).", view);
                    return ViewOutcome::DryRun;
                }
                match self.warehouse.create_view(&target, query).await {
                    Ok(()) => {
                        info!("Successfully created view {}", view);
                        ViewOutcome::Created
                    }
                    Err(e) => {
                        error!("Failed to create view {}. Error: {:#}", view, e);
                        ViewOutcome::Failed(format!("{:#}", e))
                    }
                }
            }
        }
    }
}

/// `CREATE OR REPLACE VIEW` statement for one view, newline-terminated
pub fn ddl_statement(view: &TableRef, query: &str) -> String {
    format!("CREATE OR REPLACE VIEW `{}` AS {};\n", view, query)
}

/// DDL script written alongside the migration
///
/// The file is truncated on creation and receives one statement per view,
/// whatever happened to the view itself.
pub struct DdlScript {
    path: PathBuf,
    writer: BufWriter<File>,
    statements: usize,
}

impl DdlScript {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create DDL file: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            statements: 0,
        })
    }

    pub fn append(&mut self, view: &TableRef, query: &str) -> Result<()> {
        self.writer
            .write_all(ddl_statement(view, query).as_bytes())
            .with_context(|| format!("Failed to write DDL file: {}", self.path.display()))?;
        self.statements += 1;
        Ok(())
    }

    /// Flush to disk and return the number of statements written
    pub fn finish(mut self) -> Result<usize> {
        self.writer
            .flush()
            .with_context(|| format!("Failed to write DDL file: {}", self.path.display()))?;
        Ok(self.statements)
    }
}
