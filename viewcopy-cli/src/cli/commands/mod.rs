//! Subcommand handlers and the flags they share

pub mod copy;
pub mod plan;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;

use crate::config::MigrationConfig;

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Flags shared by `copy` and `plan`; each one overrides the config file
/// and the environment
#[derive(Args, Debug, Clone, Default)]
pub struct MigrationArgs {
    /// TOML config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[arg(long, value_name = "PROJECT")]
    pub source_project: Option<String>,

    #[arg(long, value_name = "DATASET")]
    pub source_dataset: Option<String>,

    /// Defaults to the source project
    #[arg(long, value_name = "PROJECT")]
    pub destination_project: Option<String>,

    #[arg(long, value_name = "DATASET")]
    pub destination_dataset: Option<String>,

    /// Where to write the DDL script
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Create or replace views that already exist at the destination
    #[arg(long)]
    pub replace: bool,

    /// Write the DDL script without creating any view
    #[arg(long)]
    pub dry_run: bool,

    /// Also try to create views caught in a dependency cycle
    #[arg(long)]
    pub attempt_cyclic: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl MigrationArgs {
    /// Overlay the flags that were given on `config`
    pub fn apply(&self, config: &mut MigrationConfig) {
        if let Some(project) = &self.source_project {
            config.source_project = project.clone();
        }
        if let Some(dataset) = &self.source_dataset {
            config.source_dataset = dataset.clone();
        }
        if let Some(project) = &self.destination_project {
            config.destination_project = Some(project.clone());
        }
        if let Some(dataset) = &self.destination_dataset {
            config.destination_dataset = dataset.clone();
        }
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        if self.replace {
            config.replace_existing = true;
        }
        if self.dry_run {
            config.execute = false;
        }
        if self.attempt_cyclic {
            config.attempt_cyclic = true;
        }
    }
}

/// Config file and environment, then the flags on top
fn resolve_config(args: &MigrationArgs) -> Result<MigrationConfig> {
    if args.no_color {
        colored::control::set_override(false);
    }
    let mut config = MigrationConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    Ok(config)
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to format JSON output")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let mut config = MigrationConfig {
            source_project: "from-file".to_string(),
            source_dataset: "analytics".to_string(),
            destination_dataset: "analytics_copy".to_string(),
            ..MigrationConfig::default()
        };
        let args = MigrationArgs {
            source_project: Some("from-flag".to_string()),
            destination_project: Some("elsewhere".to_string()),
            output: Some(PathBuf::from("out/ddl.sql")),
            dry_run: true,
            ..MigrationArgs::default()
        };

        args.apply(&mut config);

        assert_eq!(config.source().to_string(), "from-flag.analytics");
        assert_eq!(config.destination().to_string(), "elsewhere.analytics_copy");
        assert_eq!(config.output, PathBuf::from("out/ddl.sql"));
        assert!(!config.execute);
        assert!(!config.replace_existing);
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let mut config = MigrationConfig {
            replace_existing: true,
            attempt_cyclic: true,
            ..MigrationConfig::default()
        };
        let before = config.clone();

        MigrationArgs::default().apply(&mut config);

        assert_eq!(config, before);
    }
}
