//! Command-line interface

pub mod commands;

use clap::{Parser, Subcommand};

use commands::MigrationArgs;

#[derive(Parser, Debug)]
#[command(name = "viewcopy")]
#[command(about = "Copy BigQuery views between datasets in dependency order")]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Recreate every view of the source dataset in the destination dataset
    Copy(MigrationArgs),
    /// Show each view's dependencies and the creation order without writing anything
    Plan(MigrationArgs),
}

impl Cli {
    /// Log filter used when `RUST_LOG` is not set
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity() {
        let cli = Cli::parse_from(["viewcopy", "plan"]);
        assert_eq!(cli.log_level(), log::LevelFilter::Info);

        let cli = Cli::parse_from(["viewcopy", "-v", "plan"]);
        assert_eq!(cli.log_level(), log::LevelFilter::Debug);

        let cli = Cli::parse_from(["viewcopy", "copy", "-vvv"]);
        assert_eq!(cli.log_level(), log::LevelFilter::Trace);
    }

    #[test]
    fn test_copy_flags() {
        let cli = Cli::parse_from([
            "viewcopy",
            "copy",
            "--source-project",
            "old-proj",
            "--source-dataset",
            "analytics",
            "--destination-dataset",
            "analytics_v2",
            "--replace",
            "--dry-run",
        ]);

        let Commands::Copy(args) = cli.command else {
            panic!("expected copy command");
        };
        assert_eq!(args.source_project.as_deref(), Some("old-proj"));
        assert_eq!(args.destination_dataset.as_deref(), Some("analytics_v2"));
        assert!(args.replace);
        assert!(args.dry_run);
        assert!(!args.attempt_cyclic);
    }
}
