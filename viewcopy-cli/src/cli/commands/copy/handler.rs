//! Copy command handler

use anyhow::Result;
use colored::*;
use std::fmt::Write;
use std::time::Instant;

use super::super::{MigrationArgs, OutputFormat, resolve_config, to_json};
use crate::api::BigQueryClient;
use crate::migrate::{CreationPolicy, MigrationReport, MigrationRunner, ViewOutcome};

/// Run a full migration and print its summary
pub async fn handle_copy_command(args: MigrationArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    config.validate()?;

    let client = BigQueryClient::new(&config.api)?;
    let start = Instant::now();

    let report = MigrationRunner::new(&client, &config).run().await?;

    match args.format {
        OutputFormat::Json => println!("{}", to_json(&report)?),
        OutputFormat::Text => {
            print!("{}", render_summary(&report));
            println!(
                "Finished in {}",
                format!("{:.1}s", start.elapsed().as_secs_f64()).dimmed()
            );
        }
    }

    Ok(())
}

fn outcome_marker(outcome: &ViewOutcome) -> ColoredString {
    match outcome {
        ViewOutcome::Created | ViewOutcome::Replaced => "✓".bright_green(),
        ViewOutcome::SkippedExisting | ViewOutcome::DryRun => "•".bright_blue(),
        ViewOutcome::Failed(_) | ViewOutcome::MissingQuery => "✗".bright_red(),
    }
}

/// Human-readable summary of a finished run
fn render_summary(report: &MigrationReport) -> String {
    let mut out = String::new();
    let counts = report.counts();

    let mode = match (report.policy, report.execute) {
        (_, false) => "dry run",
        (CreationPolicy::Replace, true) => "create or replace",
        (CreationPolicy::SkipExisting, true) => "skip existing",
    };

    let _ = writeln!(
        out,
        "{} {} → {} ({})",
        "Copied views".bold(),
        report.source.to_string().cyan(),
        report.destination.to_string().cyan(),
        mode
    );
    let _ = writeln!(
        out,
        "Started {}",
        report.started_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
    );
    let _ = writeln!(out);

    for processed in &report.processed {
        let detail = match &processed.outcome {
            ViewOutcome::Failed(reason) => format!("{}: {}", processed.outcome.label(), reason),
            other => other.label().to_string(),
        };
        let _ = writeln!(
            out,
            "  {} {} {}",
            outcome_marker(&processed.outcome),
            processed.name,
            format!("({})", detail).dimmed()
        );
    }
    if report.processed.is_empty() {
        let _ = writeln!(out, "  {}", "No views to copy".dimmed());
    }
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "{} views listed, {} processed: {} created, {} replaced, {} already existed, {} dry run, {} failed, {} without query",
        report.view_names.len(),
        report.processed.len(),
        counts.created,
        counts.replaced,
        counts.skipped_existing,
        counts.dry_run,
        counts.failed,
        counts.missing_query
    );

    if !report.cyclic.is_empty() {
        let _ = writeln!(
            out,
            "{} {}",
            "Circular dependencies:".yellow(),
            report.cyclic.join(", ")
        );
    }
    if !report.blocked.is_empty() {
        let _ = writeln!(
            out,
            "{} {}",
            "Blocked by a cycle:".yellow(),
            report.blocked.join(", ")
        );
    }
    if !report.warnings.is_empty() {
        let _ = writeln!(out, "{} {}", report.warnings.len(), "warning(s), see log".yellow());
    }

    let _ = writeln!(
        out,
        "DDL script: {} ({} statements)",
        report.ddl_path.display().to_string().bright_green(),
        report.ddl_statements
    );
    if report.has_problems() {
        let _ = writeln!(out, "{}", "Completed with problems".yellow().bold());
    } else {
        let _ = writeln!(out, "{}", "Completed".bright_green().bold());
    }

    out
}
