//! Key-value store seam.
//!
//! The guard reads and writes browser-local-storage-shaped records, but
//! the substrate is injected behind a trait so it can be an in-memory map
//! in tests or a libSQL file in a deployed session. Every mutation is
//! broadcast as a [`StoreEvent`] stamped with the writing session's
//! origin; cross-tab sync filters on that origin, mirroring the browser
//! rule that storage events fire only in other tabs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use crate::error::StoreError;

/// Capacity of the mutation event bus.
pub(crate) const EVENT_BUS_CAPACITY: usize = 256;

/// A storage mutation notification.
#[derive(Debug, Clone)]
pub struct StoreEvent {
    /// The mutated key.
    pub key: String,
    /// Session identity of the writer.
    pub origin: String,
}

/// Backend-agnostic key-value store with mutation notifications.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value. `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, inserting or overwriting.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Subscribe to mutations from every session on this substrate.
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;

    /// This handle's session identity, stamped on its own mutations.
    fn origin(&self) -> &str;
}

/// Shared in-memory substrate: one map, one event bus.
struct MemoryInner {
    map: RwLock<HashMap<String, String>>,
    events: broadcast::Sender<StoreEvent>,
}

/// In-memory store, the default for tests and single-session use.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
    origin: String,
}

impl MemoryStore {
    /// Create a fresh substrate with a random session origin.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            inner: Arc::new(MemoryInner {
                map: RwLock::new(HashMap::new()),
                events,
            }),
            origin: Uuid::new_v4().to_string(),
        }
    }

    /// Another handle onto the same substrate under a different session
    /// origin. Models a second tab sharing local storage.
    pub fn handle(&self, origin: impl Into<String>) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            origin: origin.into(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.map.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner
            .map
            .write()
            .await
            .insert(key.to_string(), value.to_string());

        // Broadcast — ok if no one is listening yet
        let _ = self.inner.events.send(StoreEvent {
            key: key.to_string(),
            origin: self.origin.clone(),
        });
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let removed = self.inner.map.write().await.remove(key).is_some();
        if removed {
            let _ = self.inner.events.send(StoreEvent {
                key: key.to_string(),
                origin: self.origin.clone(),
            });
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    fn origin(&self) -> &str {
        &self.origin
    }
}
