//! Dataset-qualified reference extraction from view SQL
//!
//! Matches `project.dataset.name` and `dataset.name` textually and returns the
//! bare `name` for each match. This is pattern matching, not SQL parsing:
//! references inside string literals and comments are reported, aliases and
//! quoted identifiers with unusual characters are not understood, and a
//! dataset name that happens to end another identifier (`my_dataset.t` when
//! the dataset is `dataset`) still matches.

use regex::Regex;

use crate::api::DatasetRef;

/// Compiled matcher for references into one dataset
#[derive(Debug, Clone)]
pub struct ReferencePattern {
    pattern: Regex,
}

impl ReferencePattern {
    pub fn new(dataset: &DatasetRef) -> Result<Self, regex::Error> {
        let project = regex::escape(&dataset.project);
        let dataset = regex::escape(&dataset.dataset);
        // Leftmost alternative wins, so a project-qualified reference is
        // consumed whole and never reported a second time as `dataset.name`.
        let pattern = Regex::new(&format!(
            r"{project}\.{dataset}\.([A-Za-z0-9_]+)|{dataset}\.([A-Za-z0-9_]+)"
        ))?;
        Ok(Self { pattern })
    }

    /// All referenced names in order of appearance, repeats included
    pub fn extract(&self, sql: &str) -> Vec<String> {
        self.pattern
            .captures_iter(sql)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
            .map(|m| m.as_str().to_string())
            .collect()
    }
}
