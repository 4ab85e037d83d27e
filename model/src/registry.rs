//! Model registry.
//!
//! Tracks models by table name so independent callers can share them.

use std::sync::Arc;

use dashmap::DashMap;

use crate::model::Model;

/// Named models shared across callers.
///
/// Thread-safe and can be shared via `Arc`.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    /// All registered models, keyed by table name.
    models: DashMap<String, Model>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            models: DashMap::new(),
        }
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a model under its table name.
    ///
    /// Returns the model previously registered under that name.
    pub fn register(&self, model: Model) -> Option<Model> {
        let table = model.table_name().to_string();
        let previous = self.models.insert(table.clone(), model);
        if previous.is_some() {
            tracing::warn!(table = %table, "Replaced registered model");
        } else {
            tracing::info!(table = %table, "Model registered");
        }
        previous
    }

    pub fn get(&self, table: &str) -> Option<Model> {
        self.models.get(table).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, table: &str) -> Option<Model> {
        self.models.remove(table).map(|(_, model)| model)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.models.contains_key(table)
    }

    /// Registered table names, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Wait until every registered model's table is ready.
    pub async fn ready(&self) {
        let models: Vec<Model> = self.models.iter().map(|e| e.value().clone()).collect();
        futures::future::join_all(models.iter().map(|model| model.table().ready())).await;
    }
}
