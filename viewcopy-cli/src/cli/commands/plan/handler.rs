//! Plan command handler

use anyhow::Result;
use colored::*;
use std::fmt::Write;

use super::super::{MigrationArgs, OutputFormat, resolve_config, to_json};
use crate::api::BigQueryClient;
use crate::migrate::{MigrationPlan, MigrationRunner};

/// Read and order the source views without touching the destination
pub async fn handle_plan_command(args: MigrationArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    let client = BigQueryClient::new(&config.api)?;

    let plan = MigrationRunner::new(&client, &config).plan().await?;

    match args.format {
        OutputFormat::Json => println!("{}", to_json(&plan)?),
        OutputFormat::Text => print!("{}", render_plan(&plan, config.attempt_cyclic)),
    }

    Ok(())
}

fn render_plan(plan: &MigrationPlan, attempt_cyclic: bool) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}", "Dependencies".bold());
    for view in &plan.fetched.view_names {
        if plan.fetched.unavailable.contains(view) {
            let _ = writeln!(out, "  {} {}", view, "(definition unavailable)".red());
            continue;
        }
        let deps = plan.dependencies_of(view);
        if deps.is_empty() {
            let _ = writeln!(out, "  {} {}", view, "(none)".dimmed());
        } else {
            let _ = writeln!(out, "  {} → {}", view, deps.join(", "));
        }
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "{}", "Creation order".bold());
    let queue = plan.creation_queue(attempt_cyclic);
    for (i, view) in queue.iter().enumerate() {
        let ordered = i < plan.schedule.order.len();
        let marker = if ordered {
            String::new()
        } else {
            format!(" {}", "(unordered)".yellow())
        };
        let _ = writeln!(out, "  {:>3}. {}{}", i + 1, view.cyan(), marker);
    }
    if queue.is_empty() {
        let _ = writeln!(out, "  {}", "Nothing to create".dimmed());
    }

    if let Some(cycle) = plan.schedule.cycle_error() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", cycle.to_string().yellow());
    }
    if !plan.schedule.blocked.is_empty() {
        let _ = writeln!(
            out,
            "{} {}",
            "Blocked by a cycle:".yellow(),
            plan.schedule.blocked.join(", ")
        );
    }
    if !plan.schedule.is_complete() && !attempt_cyclic {
        let _ = writeln!(
            out,
            "{}",
            "Views above are left out; use --attempt-cyclic to try them anyway".dimmed()
        );
    }

    out
}
