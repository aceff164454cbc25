//! Orchestrates a migration run
//!
//! fetch → dependency graph → schedule → rewrite → materialize + DDL.
//! Everything a run accumulates is carried in explicit values so each step
//! can be tested on its own.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;

use super::dependency_graph::{DependencyGraph, Schedule};
use super::fetch::fetch_views;
use super::materialize::{CreationPolicy, DdlScript, Materializer, ViewOutcome};
use super::references::ReferencePattern;
use super::report::MigrationReport;
use super::rewrite::QueryRewriter;
use super::types::FetchedViews;
use crate::api::Warehouse;
use crate::config::MigrationConfig;

/// Source views and the order they should be created in
#[derive(Debug, Clone, Serialize)]
pub struct MigrationPlan {
    pub fetched: FetchedViews,
    /// View -> referenced names, as extracted from the raw definitions.
    /// Sorted by view name so serialized plans are stable.
    pub dependencies: BTreeMap<String, Vec<String>>,
    pub schedule: Schedule,
    pub warnings: Vec<String>,
}

impl MigrationPlan {
    fn new(fetched: FetchedViews, graph: DependencyGraph, schedule: Schedule) -> Self {
        let mut warnings: Vec<String> = fetched
            .unavailable
            .iter()
            .map(|name| format!("Definition of view {} could not be fetched", name))
            .collect();

        if let Some(cycle) = schedule.cycle_error() {
            warnings.push(cycle.to_string());
        }
        if !schedule.blocked.is_empty() {
            warnings.push(blocked_warning(&schedule.blocked));
        }

        Self {
            fetched,
            dependencies: graph.dependencies.into_iter().collect(),
            schedule,
            warnings,
        }
    }

    /// Views to process, in order. With `attempt_cyclic` the views that
    /// could not be ordered follow the ordered ones.
    pub fn creation_queue(&self, attempt_cyclic: bool) -> Vec<String> {
        let mut queue = self.schedule.order.clone();
        if attempt_cyclic {
            queue.extend(self.schedule.leftovers());
        }
        queue
    }

    pub fn dependencies_of(&self, view: &str) -> &[String] {
        self.dependencies
            .get(view)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn blocked_warning(blocked: &[String]) -> String {
    format!(
        "Views referenced from a dependency cycle could not be ordered: {}",
        blocked.join(", ")
    )
}

/// One migration run over a warehouse
pub struct MigrationRunner<'a> {
    warehouse: &'a dyn Warehouse,
    config: &'a MigrationConfig,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(warehouse: &'a dyn Warehouse, config: &'a MigrationConfig) -> Self {
        Self { warehouse, config }
    }

    /// Read the source dataset and order its views. Nothing is written.
    pub async fn plan(&self) -> Result<MigrationPlan> {
        self.config.validate_source()?;
        let source = self.config.source();
        let fetched = fetch_views(self.warehouse, &source).await?;

        let pattern = ReferencePattern::new(&source)
            .with_context(|| format!("Failed to build reference pattern for {}", source))?;
        let graph = DependencyGraph::build(&fetched, &pattern);
        let schedule = graph.schedule();

        info!(
            "Scheduled {} of {} views for creation",
            schedule.order.len(),
            graph.views.len()
        );
        if let Some(cycle) = schedule.cycle_error() {
            warn!("{}", cycle);
            if self.config.attempt_cyclic {
                warn!("Attempting to create the remaining views despite circular dependencies.");
            }
        }
        if !schedule.blocked.is_empty() {
            warn!("{}", blocked_warning(&schedule.blocked));
        }
        debug!("Sorted views for creation: {:?}", schedule.order);

        Ok(MigrationPlan::new(fetched, graph, schedule))
    }

    /// Plan, then create every scheduled view and write the DDL script
    pub async fn run(&self) -> Result<MigrationReport> {
        self.config.validate()?;

        let source = self.config.source();
        let destination = self.config.destination();
        let policy = CreationPolicy::from_replace_flag(self.config.replace_existing);

        let plan = self.plan().await?;

        let mut report = MigrationReport::new(
            source.clone(),
            destination.clone(),
            policy,
            self.config.execute,
            self.config.output.clone(),
        );
        report.view_names = plan.fetched.view_names.clone();
        report.unavailable = plan.fetched.unavailable.clone();
        report.order = plan.schedule.order.clone();
        report.cyclic = plan.schedule.cyclic.clone();
        report.blocked = plan.schedule.blocked.clone();
        report.warnings = plan.warnings.clone();

        let rewriter = QueryRewriter::new(&source, &destination)
            .with_context(|| format!("Failed to build rewriter for {}", source))?;
        let materializer =
            Materializer::new(self.warehouse, destination, policy, self.config.execute);
        let mut script = DdlScript::create(&self.config.output)?;

        for view in plan.creation_queue(self.config.attempt_cyclic) {
            let Some(definition) = plan.fetched.definition(&view) else {
                let message = format!("No query found for view {}. Skipping.", view);
                warn!("{}", message);
                report.warnings.push(message);
                report.record(&view, ViewOutcome::MissingQuery);
                continue;
            };

            let query = rewriter.rewrite(&definition.query);
            info!("Creating view: {}", view);
            debug!("{}", query);

            let outcome = materializer.materialize(&view, &query).await;
            script.append(&materializer.target(&view), &query)?;
            report.record(&view, outcome);
        }

        report.ddl_statements = script.finish()?;
        info!(
            "View copying process completed. DDL script saved to {}.",
            self.config.output.display()
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::DatasetRef;
    use crate::api::memory::{InMemoryWarehouse, RecordedCall};
    use std::fs;
    use std::path::Path;

    fn source() -> DatasetRef {
        DatasetRef::new("old_proj", "old_ds")
    }

    fn destination() -> DatasetRef {
        DatasetRef::new("new_proj", "new_ds")
    }

    fn config(output: &Path) -> MigrationConfig {
        MigrationConfig {
            source_project: "old_proj".to_string(),
            source_dataset: "old_ds".to_string(),
            destination_project: Some("new_proj".to_string()),
            destination_dataset: "new_ds".to_string(),
            output: output.to_path_buf(),
            ..MigrationConfig::default()
        }
    }

    fn ddl_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_views_are_created_in_dependency_order() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("ddl.sql");
        // Listed dependents first to make sure ordering is not listing order
        let warehouse = InMemoryWarehouse::new()
            .with_view(source().table("c"), "SELECT * FROM old_proj.old_ds.a JOIN old_ds.b USING (id)")
            .with_view(source().table("b"), "SELECT * FROM old_ds.a")
            .with_view(source().table("a"), "SELECT * FROM old_ds.raw_events")
            .with_table(source().table("raw_events"));
        let config = config(&output);

        let report = MigrationRunner::new(&warehouse, &config).run().await.unwrap();

        assert_eq!(report.order, vec!["a", "b", "c"]);
        assert_eq!(
            warehouse.calls(),
            vec![
                RecordedCall::Create("new_proj.new_ds.a".to_string()),
                RecordedCall::Create("new_proj.new_ds.b".to_string()),
                RecordedCall::Create("new_proj.new_ds.c".to_string()),
            ]
        );
        assert_eq!(
            warehouse.view_query(&destination().table("c")).as_deref(),
            Some("SELECT * FROM new_proj.new_ds.a JOIN new_ds.b USING (id)")
        );
        assert_eq!(
            ddl_lines(&output),
            vec![
                "CREATE OR REPLACE VIEW `new_proj.new_ds.a` AS SELECT * FROM new_ds.raw_events;",
                "CREATE OR REPLACE VIEW `new_proj.new_ds.b` AS SELECT * FROM new_ds.a;",
                "CREATE OR REPLACE VIEW `new_proj.new_ds.c` AS SELECT * FROM new_proj.new_ds.a JOIN new_ds.b USING (id);",
            ]
        );
        assert_eq!(report.ddl_statements, 3);
        assert!(!report.has_problems());
    }

    #[tokio::test]
    async fn test_base_table_reference_raises_no_warning() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("ddl.sql");
        let warehouse = InMemoryWarehouse::new()
            .with_table(source().table("raw_events"))
            .with_view(source().table("z"), "SELECT * FROM old_ds.raw_events");
        let config = config(&output);

        let runner = MigrationRunner::new(&warehouse, &config);
        let plan = runner.plan().await.unwrap();
        assert_eq!(plan.dependencies_of("z"), ["raw_events"]);
        assert!(plan.warnings.is_empty());

        let report = runner.run().await.unwrap();
        assert_eq!(report.order, vec!["z"]);
        assert!(report.warnings.is_empty());
        assert!(report.outcome_of("raw_events").is_none());
    }

    #[tokio::test]
    async fn test_plan_dependencies_serialize_in_stable_order() {
        let dir = tempfile::tempdir().unwrap();
        let warehouse = InMemoryWarehouse::new()
            .with_view(source().table("zeta"), "SELECT * FROM old_ds.mid")
            .with_view(source().table("alpha"), "SELECT 1")
            .with_view(source().table("mid"), "SELECT * FROM old_ds.alpha");
        let config = config(&dir.path().join("ddl.sql"));

        let plan = MigrationRunner::new(&warehouse, &config).plan().await.unwrap();

        assert_eq!(
            serde_json::to_string(&plan.dependencies).unwrap(),
            r#"{"alpha":[],"mid":["alpha"],"zeta":["mid"]}"#
        );
        assert_eq!(plan.schedule.order, vec!["alpha", "mid", "zeta"]);
    }

    #[tokio::test]
    async fn test_cycle_is_reported_and_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("ddl.sql");
        let warehouse = InMemoryWarehouse::new()
            .with_view(source().table("x"), "SELECT * FROM old_ds.y")
            .with_view(source().table("y"), "SELECT * FROM old_ds.x")
            .with_view(source().table("solo"), "SELECT 1");
        let config = config(&output);

        let report = MigrationRunner::new(&warehouse, &config).run().await.unwrap();

        assert_eq!(report.order, vec!["solo"]);
        assert_eq!(report.cyclic, vec!["x", "y"]);
        assert!(
            report
                .warnings
                .iter()
                .any(|w| w == "Circular dependency detected involving: x, y")
        );
        assert!(report.outcome_of("x").is_none());
        assert_eq!(ddl_lines(&output).len(), 1);
    }

    #[tokio::test]
    async fn test_cycle_fallback_still_writes_ddl() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("ddl.sql");
        let warehouse = InMemoryWarehouse::new()
            .with_view(source().table("x"), "SELECT * FROM old_ds.y")
            .with_view(source().table("y"), "SELECT * FROM old_ds.x");
        let config = MigrationConfig {
            attempt_cyclic: true,
            ..config(&output)
        };

        let report = MigrationRunner::new(&warehouse, &config).run().await.unwrap();

        assert!(report.order.is_empty());
        assert_eq!(report.outcome_of("x"), Some(&ViewOutcome::Created));
        assert_eq!(report.outcome_of("y"), Some(&ViewOutcome::Created));
        let ddl = ddl_lines(&output);
        assert_eq!(ddl.len(), 2);
        assert!(ddl[0].contains("new_proj.new_ds.x"));
        assert!(ddl[1].contains("new_proj.new_ds.y"));
    }

    #[tokio::test]
    async fn test_unfetchable_view_is_skipped_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("ddl.sql");
        let warehouse = InMemoryWarehouse::new()
            .with_view(source().table("gone"), "SELECT 1")
            .with_view(source().table("kept"), "SELECT * FROM old_ds.gone")
            .vanish(&source().table("gone"));
        let config = config(&output);

        let report = MigrationRunner::new(&warehouse, &config).run().await.unwrap();

        assert_eq!(report.unavailable, vec!["gone"]);
        assert_eq!(report.order, vec!["gone", "kept"]);
        assert_eq!(report.outcome_of("gone"), Some(&ViewOutcome::MissingQuery));
        assert_eq!(report.outcome_of("kept"), Some(&ViewOutcome::Created));
        assert!(report.warnings.iter().any(|w| w.contains("No query found for view gone")));
        assert_eq!(ddl_lines(&output).len(), 1);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("ddl.sql");
        let warehouse = InMemoryWarehouse::new()
            .with_view(source().table("a"), "SELECT 1")
            .with_view(source().table("b"), "SELECT 2")
            .break_create(&destination().table("a"));
        let config = config(&output);

        let report = MigrationRunner::new(&warehouse, &config).run().await.unwrap();

        assert!(report.outcome_of("a").unwrap().is_failure());
        assert_eq!(report.outcome_of("b"), Some(&ViewOutcome::Created));
        // The script reflects the intended state, not only what succeeded
        assert_eq!(ddl_lines(&output).len(), 2);
        assert_eq!(report.counts().failed, 1);
    }

    #[tokio::test]
    async fn test_skip_existing_still_writes_ddl() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("ddl.sql");
        let warehouse = InMemoryWarehouse::new()
            .with_view(source().table("a"), "SELECT 1")
            .with_view(destination().table("a"), "SELECT 'already here'");
        let config = config(&output);

        let report = MigrationRunner::new(&warehouse, &config).run().await.unwrap();

        assert_eq!(report.outcome_of("a"), Some(&ViewOutcome::SkippedExisting));
        assert_eq!(
            ddl_lines(&output),
            vec!["CREATE OR REPLACE VIEW `new_proj.new_ds.a` AS SELECT 1;"]
        );
    }

    #[tokio::test]
    async fn test_dry_run_replace_mode() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("ddl.sql");
        let warehouse = InMemoryWarehouse::new().with_view(source().table("a"), "SELECT 1");
        let config = MigrationConfig {
            replace_existing: true,
            execute: false,
            ..config(&output)
        };

        let report = MigrationRunner::new(&warehouse, &config).run().await.unwrap();

        assert_eq!(report.outcome_of("a"), Some(&ViewOutcome::DryRun));
        assert!(warehouse.calls().is_empty());
        assert_eq!(report.ddl_statements, 1);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_any_call() {
        let dir = tempfile::tempdir().unwrap();
        let warehouse = InMemoryWarehouse::new().with_view(source().table("a"), "SELECT 1");
        let config = MigrationConfig {
            destination_dataset: String::new(),
            ..config(&dir.path().join("ddl.sql"))
        };

        let err = MigrationRunner::new(&warehouse, &config).run().await.unwrap_err();

        assert!(err.to_string().contains("destination_dataset"));
        assert!(!dir.path().join("ddl.sql").exists());
    }
}
