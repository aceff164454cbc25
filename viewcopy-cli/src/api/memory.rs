//! In-memory warehouse used by tests
//!
//! Tables keep insertion order so listing order is deterministic. Every write
//! call is recorded, and individual tables can be made to fail on lookup or
//! on creation.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

use super::models::{DatasetRef, Lookup, TableDefinition, TableKind, TableListing, TableRef};
use super::warehouse::{ApiError, Warehouse};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Create(String),
    CreateOrReplace(String),
}

#[derive(Debug, Default)]
struct State {
    tables: Vec<TableDefinition>,
    calls: Vec<RecordedCall>,
}

#[derive(Debug, Default)]
pub struct InMemoryWarehouse {
    state: Mutex<State>,
    /// Listed but reported as not found on lookup
    vanished: HashSet<String>,
    /// Lookups fail with a server error
    broken_lookups: HashSet<String>,
    /// Create calls fail with a server error
    broken_creates: HashSet<String>,
}

impl InMemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_view(self, table: TableRef, query: &str) -> Self {
        self.insert(table, TableKind::View, Some(query.to_string()));
        self
    }

    pub fn with_table(self, table: TableRef) -> Self {
        self.insert(table, TableKind::Table, None);
        self
    }

    pub fn vanish(mut self, table: &TableRef) -> Self {
        self.vanished.insert(table.to_string());
        self
    }

    pub fn break_lookup(mut self, table: &TableRef) -> Self {
        self.broken_lookups.insert(table.to_string());
        self
    }

    pub fn break_create(mut self, table: &TableRef) -> Self {
        self.broken_creates.insert(table.to_string());
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn view_query(&self, table: &TableRef) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .tables
            .iter()
            .find(|t| &t.reference == table)
            .and_then(|t| t.view_query.clone())
    }

    fn insert(&self, table: TableRef, kind: TableKind, view_query: Option<String>) {
        let mut state = self.state.lock().unwrap();
        state.tables.retain(|t| t.reference != table);
        state.tables.push(TableDefinition {
            reference: table,
            kind,
            view_query,
        });
    }

    fn exists(&self, table: &TableRef) -> bool {
        let state = self.state.lock().unwrap();
        state.tables.iter().any(|t| &t.reference == table)
    }

    fn check_create(&self, table: &TableRef) -> Result<()> {
        if self.broken_creates.contains(&table.to_string()) {
            return Err(ApiError::Status {
                status: 400,
                message: format!("Invalid view definition for {}", table),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl Warehouse for InMemoryWarehouse {
    async fn list_tables(&self, dataset: &DatasetRef) -> Result<Vec<TableListing>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tables
            .iter()
            .filter(|t| &t.reference.dataset_ref() == dataset)
            .map(|t| TableListing {
                name: t.reference.table.clone(),
                kind: t.kind.clone(),
            })
            .collect())
    }

    async fn get_table(&self, table: &TableRef) -> Result<Lookup<TableDefinition>> {
        let key = table.to_string();
        if self.broken_lookups.contains(&key) {
            return Err(anyhow!(ApiError::Status {
                status: 500,
                message: "backendError".to_string(),
            }));
        }
        if self.vanished.contains(&key) {
            return Ok(Lookup::NotFound);
        }

        let state = self.state.lock().unwrap();
        Ok(match state.tables.iter().find(|t| &t.reference == table) {
            Some(definition) => Lookup::Found(definition.clone()),
            None => Lookup::NotFound,
        })
    }

    async fn create_view(&self, table: &TableRef, query: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(RecordedCall::Create(table.to_string()));
        self.check_create(table)?;
        if self.exists(table) {
            return Err(ApiError::AlreadyExists(table.to_string()).into());
        }
        self.insert(table.clone(), TableKind::View, Some(query.to_string()));
        Ok(())
    }

    async fn create_or_replace_view(&self, table: &TableRef, query: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(RecordedCall::CreateOrReplace(table.to_string()));
        self.check_create(table)?;
        self.insert(table.clone(), TableKind::View, Some(query.to_string()));
        Ok(())
    }
}
