//! Types shared across the migration steps

use serde::Serialize;

/// A view's definition as stored at the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewDefinition {
    pub name: String,
    /// Raw SQL, before any rewriting
    pub query: String,
}

impl ViewDefinition {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
        }
    }
}

/// Everything read from the source dataset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchedViews {
    /// Every VIEW listed in the source dataset, in listing order
    pub view_names: Vec<String>,
    /// Definitions that could be fetched, in listing order
    pub definitions: Vec<ViewDefinition>,
    /// Listed views whose definition could not be fetched
    pub unavailable: Vec<String>,
}

impl FetchedViews {
    pub fn definition(&self, name: &str) -> Option<&ViewDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }
}
