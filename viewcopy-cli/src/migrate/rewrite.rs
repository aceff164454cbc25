//! Rewrites dataset-qualified references for the destination
//!
//! Substitution is textual, like reference extraction. `dataset.` is also
//! rewritten where it ends a longer identifier (`odds.t` for dataset `ds`).
//! Because both forms are matched in one left-to-right pass, whichever match
//! starts first wins: when such an identifier runs straight into
//! `project.dataset.` (project `s`, dataset `ds`, text `ds.ds.t`), the
//! dataset-only match at the start is taken and the qualified one it overlaps
//! is not.

use regex::{Captures, Regex};

use crate::api::DatasetRef;

/// Moves `source` references in SQL text over to `destination`
///
/// `project.dataset.` becomes `new_project.new_dataset.` and any remaining
/// `dataset.` becomes `new_dataset.`. Both rules run in a single left-to-right
/// pass, so replaced text is never rewritten a second time even when the new
/// names contain the old ones.
#[derive(Debug, Clone)]
pub struct QueryRewriter {
    pattern: Regex,
    qualified_prefix: String,
    dataset_prefix: String,
}

impl QueryRewriter {
    pub fn new(source: &DatasetRef, destination: &DatasetRef) -> Result<Self, regex::Error> {
        let qualified = format!("{}.{}.", source.project, source.dataset);
        let dataset_only = format!("{}.", source.dataset);
        let pattern = Regex::new(&format!(
            "({})|{}",
            regex::escape(&qualified),
            regex::escape(&dataset_only)
        ))?;

        Ok(Self {
            pattern,
            qualified_prefix: format!("{}.{}.", destination.project, destination.dataset),
            dataset_prefix: format!("{}.", destination.dataset),
        })
    }

    pub fn rewrite(&self, sql: &str) -> String {
        self.pattern
            .replace_all(sql, |caps: &Captures| {
                if caps.get(1).is_some() {
                    self.qualified_prefix.clone()
                } else {
                    self.dataset_prefix.clone()
                }
            })
            .into_owned()
    }
}
