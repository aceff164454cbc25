//! Dependency graph logic for ordering view creation
//!
//! This module provides functions to:
//! - Build a dependency graph from the references in each view's SQL
//! - Schedule views so every view is created after the views it reads from
//! - Report views caught in reference cycles

use log::debug;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

use super::references::ReferencePattern;
use super::types::FetchedViews;

/// Views and the names each one references
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// View names in source listing order
    pub views: Vec<String>,
    /// View -> referenced names in order of appearance. Repeats are kept and
    /// names may be base tables rather than views.
    pub dependencies: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Build the graph from raw (not yet rewritten) view definitions
    ///
    /// Views without a fetched definition stay in the view list but have no
    /// dependency entry.
    pub fn build(fetched: &FetchedViews, pattern: &ReferencePattern) -> Self {
        let dependencies = fetched
            .definitions
            .iter()
            .map(|definition| {
                let refs = pattern.extract(&definition.query);
                debug!("View: {}, Dependencies: {:?}", definition.name, refs);
                (definition.name.clone(), refs)
            })
            .collect();

        Self::from_parts(fetched.view_names.clone(), dependencies)
    }

    pub fn from_parts(views: Vec<String>, dependencies: HashMap<String, Vec<String>>) -> Self {
        // Listing order is kept; a repeated name would otherwise be scheduled twice
        let mut seen = HashSet::new();
        let views = views
            .into_iter()
            .filter(|v| seen.insert(v.clone()))
            .collect();

        Self {
            views,
            dependencies,
        }
    }

    pub fn dependencies_of(&self, view: &str) -> &[String] {
        self.dependencies
            .get(view)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// How many times each name is referenced by a view
    ///
    /// Every view gets an entry (possibly 0), and so does every referenced
    /// name that is not a view.
    pub fn in_degrees(&self) -> HashMap<String, usize> {
        let mut in_degree: HashMap<String, usize> =
            self.views.iter().map(|v| (v.clone(), 0)).collect();

        for view in &self.views {
            for dep in self.dependencies_of(view) {
                *in_degree.entry(dep.clone()).or_insert(0) += 1;
            }
        }

        in_degree
    }

    /// Order views for creation using Kahn's algorithm
    ///
    /// The in-degree of a name counts the views referencing it, so the
    /// traversal starts from views nothing depends on and releases a
    /// dependency once all of its dependents have been visited. That visit
    /// order is a teardown order; the creation order is its reverse. The
    /// frontier is seeded in reverse listing order so that, after reversal,
    /// independent views keep their listing order.
    pub fn schedule(&self) -> Schedule {
        let view_set: HashSet<&str> = self.views.iter().map(String::as_str).collect();
        let mut in_degree = self.in_degrees();

        let mut queue: VecDeque<&str> = self
            .views
            .iter()
            .rev()
            .filter(|v| in_degree.get(v.as_str()) == Some(&0))
            .map(String::as_str)
            .collect();

        let mut visited = Vec::with_capacity(self.views.len());
        while let Some(view) = queue.pop_front() {
            visited.push(view.to_string());

            for dep in self.dependencies_of(view).iter().rev() {
                if let Some(count) = in_degree.get_mut(dep.as_str()) {
                    *count -= 1;
                    // Base tables are never creation targets
                    if *count == 0 && view_set.contains(dep.as_str()) {
                        queue.push_back(dep.as_str());
                    }
                }
            }
        }
        visited.reverse();

        let (cyclic, blocked): (Vec<String>, Vec<String>) = self
            .views
            .iter()
            .filter(|v| in_degree.get(v.as_str()).is_some_and(|&d| d > 0))
            .cloned()
            .partition(|v| self.reaches_itself(v, &view_set));

        Schedule {
            order: visited,
            cyclic,
            blocked,
        }
    }

    /// Whether `start` can reach itself through view-to-view references
    fn reaches_itself(&self, start: &str, view_set: &HashSet<&str>) -> bool {
        let mut stack: Vec<&str> = self
            .dependencies_of(start)
            .iter()
            .map(String::as_str)
            .collect();
        let mut seen = HashSet::new();

        while let Some(name) = stack.pop() {
            if name == start {
                return true;
            }
            if !view_set.contains(name) || !seen.insert(name) {
                continue;
            }
            stack.extend(self.dependencies_of(name).iter().map(String::as_str));
        }

        false
    }
}

/// Creation order plus the views that could not be ordered
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Schedule {
    /// Views in creation order (dependencies first)
    pub order: Vec<String>,
    /// Views on a reference cycle, in listing order
    pub cyclic: Vec<String>,
    /// Views left unordered because views on a cycle reference them
    pub blocked: Vec<String>,
}

impl Schedule {
    pub fn is_complete(&self) -> bool {
        self.cyclic.is_empty() && self.blocked.is_empty()
    }

    pub fn cycle_error(&self) -> Option<CycleError> {
        if self.cyclic.is_empty() {
            None
        } else {
            Some(CycleError {
                views: self.cyclic.clone(),
            })
        }
    }

    /// Unordered views for a best-effort pass: blocked ones first, then cyclic
    pub fn leftovers(&self) -> Vec<String> {
        self.blocked
            .iter()
            .chain(self.cyclic.iter())
            .cloned()
            .collect()
    }

    #[cfg(test)]
    pub fn position(&self, view: &str) -> Option<usize> {
        self.order.iter().position(|v| v == view)
    }
}

/// Views found on a reference cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError {
    pub views: Vec<String>,
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Circular dependency detected involving: {}", self.views.join(", "))
    }
}

impl std::error::Error for CycleError {}
