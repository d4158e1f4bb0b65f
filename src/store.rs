//! Mock definition store.
//!
//! The engine only reads snapshots through [`MockStore`]. [`InMemoryStore`]
//! backs the CLI and tests, and supports the management operations a front
//! door needs (create, upsert, remove, toggle).

use crate::config::{MockDefinition, MockServerConfig};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Store access errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("mock store unavailable: {0}")]
    Unavailable(String),

    #[error("mock {0} not found")]
    NotFound(i64),
}

/// Read side of the mock definition store.
#[async_trait]
pub trait MockStore: Send + Sync {
    /// Enabled definitions in iteration order.
    async fn list_enabled_definitions(&self) -> Result<Vec<MockDefinition>, StoreError>;

    /// Global serving switch.
    async fn is_serving_enabled(&self) -> Result<bool, StoreError>;
}

/// Definitions held in memory, in insertion order.
pub struct InMemoryStore {
    definitions: RwLock<Vec<MockDefinition>>,
    serving_enabled: AtomicBool,
    next_id: AtomicI64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(Vec::new(), true)
    }
}

impl InMemoryStore {
    /// Create a store from definitions. Definitions without an id are
    /// assigned one.
    pub fn new(definitions: Vec<MockDefinition>, serving_enabled: bool) -> Self {
        let max_id = definitions.iter().map(|d| d.id).max().unwrap_or(0);
        let mut store = Self {
            definitions: RwLock::new(Vec::new()),
            serving_enabled: AtomicBool::new(serving_enabled),
            next_id: AtomicI64::new(max_id + 1),
        };
        let definitions = definitions
            .into_iter()
            .map(|mut d| {
                if d.id == 0 {
                    d.id = store.allocate_id();
                }
                d
            })
            .collect();
        store.definitions = RwLock::new(definitions);
        store
    }

    pub fn from_config(config: &MockServerConfig) -> Self {
        Self::new(config.mocks.clone(), config.settings.serving_enabled)
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Insert a new definition, returning its assigned id.
    pub async fn create(&self, mut definition: MockDefinition) -> i64 {
        let now = Utc::now();
        definition.id = self.allocate_id();
        definition.created_at = Some(now);
        definition.updated_at = Some(now);
        let id = definition.id;
        debug!(id, name = %definition.name, "Mock created");
        self.definitions.write().await.push(definition);
        id
    }

    /// Replace the definition with the same id, keeping its position and
    /// creation time, or insert it when no such id exists. Returns the id.
    pub async fn upsert(&self, mut definition: MockDefinition) -> i64 {
        let mut definitions = self.definitions.write().await;
        if let Some(slot) = definitions.iter_mut().find(|d| d.id == definition.id) {
            definition.created_at = slot.created_at;
            definition.updated_at = Some(Utc::now());
            *slot = definition;
            return slot.id;
        }
        drop(definitions);
        self.create(definition).await
    }

    /// Remove a definition. Returns whether it existed.
    pub async fn remove(&self, id: i64) -> bool {
        let mut definitions = self.definitions.write().await;
        let before = definitions.len();
        definitions.retain(|d| d.id != id);
        definitions.len() != before
    }

    /// Flip a definition's enabled flag, returning the new value.
    pub async fn toggle(&self, id: i64) -> Result<bool, StoreError> {
        let mut definitions = self.definitions.write().await;
        let definition = definitions
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or(StoreError::NotFound(id))?;
        definition.enabled = !definition.enabled;
        definition.updated_at = Some(Utc::now());
        Ok(definition.enabled)
    }

    pub async fn get(&self, id: i64) -> Option<MockDefinition> {
        self.definitions
            .read()
            .await
            .iter()
            .find(|d| d.id == id)
            .cloned()
    }

    /// All definitions, enabled or not.
    pub async fn all(&self) -> Vec<MockDefinition> {
        self.definitions.read().await.clone()
    }

    /// Replace every definition at once.
    pub async fn replace_all(&self, definitions: Vec<MockDefinition>) {
        let max_id = definitions.iter().map(|d| d.id).max().unwrap_or(0);
        self.next_id.fetch_max(max_id + 1, Ordering::SeqCst);
        let definitions = definitions
            .into_iter()
            .map(|mut d| {
                if d.id == 0 {
                    d.id = self.allocate_id();
                }
                d
            })
            .collect();
        *self.definitions.write().await = definitions;
    }

    pub fn set_serving_enabled(&self, enabled: bool) {
        self.serving_enabled.store(enabled, Ordering::SeqCst);
    }
}

#[async_trait]
impl MockStore for InMemoryStore {
    async fn list_enabled_definitions(&self) -> Result<Vec<MockDefinition>, StoreError> {
        Ok(self
            .definitions
            .read()
            .await
            .iter()
            .filter(|d| d.enabled)
            .cloned()
            .collect())
    }

    async fn is_serving_enabled(&self) -> Result<bool, StoreError> {
        Ok(self.serving_enabled.load(Ordering::SeqCst))
    }
}
