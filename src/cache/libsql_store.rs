//! libSQL store backend.
//!
//! The durable analog of browser local storage: one `records` table of
//! string keys and values, local file or in-memory. Carries the same
//! mutation event bus and origin identity as the in-memory store, so
//! cross-tab sync works unchanged on top of it.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, params};
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use super::kv::{EVENT_BUS_CAPACITY, KeyValueStore, StoreEvent};
use crate::error::StoreError;

/// Shared substrate: one database, one connection, one event bus.
struct LibSqlInner {
    #[allow(dead_code)]
    db: libsql::Database,
    conn: Connection,
    events: broadcast::Sender<StoreEvent>,
}

/// Key-value store over a libSQL database.
///
/// Reuses a single connection for all operations; `libsql::Connection` is
/// safe for concurrent async use.
#[derive(Clone)]
pub struct LibSqlStore {
    inner: Arc<LibSqlInner>,
    origin: String,
}

impl LibSqlStore {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Backend(format!("Failed to create store directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to open libSQL store: {e}")))?;

        let store = Self::from_db(db)?;
        store.init_schema().await?;
        info!(path = %path.display(), "Store opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to create in-memory store: {e}")))?;

        let store = Self::from_db(db)?;
        store.init_schema().await?;
        Ok(store)
    }

    fn from_db(db: libsql::Database) -> Result<Self, StoreError> {
        let conn = db
            .connect()
            .map_err(|e| StoreError::Backend(format!("Failed to create connection: {e}")))?;
        let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);

        Ok(Self {
            inner: Arc::new(LibSqlInner { db, conn, events }),
            origin: Uuid::new_v4().to_string(),
        })
    }

    /// Another handle onto the same substrate under a different session
    /// origin. Models a second tab sharing the same storage.
    pub fn handle(&self, origin: impl Into<String>) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            origin: origin.into(),
        }
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.inner
            .conn
            .execute(
                "CREATE TABLE IF NOT EXISTS records (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )",
                (),
            )
            .await
            .map_err(|e| StoreError::Backend(format!("init_schema: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for LibSqlStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut rows = self
            .inner
            .conn
            .query("SELECT value FROM records WHERE key = ?1", params![key])
            .await
            .map_err(|e| StoreError::Backend(format!("get: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value: String = row
                    .get(0)
                    .map_err(|e| StoreError::Backend(format!("get row parse: {e}")))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Backend(format!("get: {e}"))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.inner
            .conn
            .execute(
                "INSERT INTO records (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (key) DO UPDATE SET value = ?2, updated_at = ?3",
                params![key, value, now],
            )
            .await
            .map_err(|e| StoreError::Backend(format!("set: {e}")))?;

        // Broadcast — ok if no one is listening yet
        let _ = self.inner.events.send(StoreEvent {
            key: key.to_string(),
            origin: self.origin.clone(),
        });
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let count = self
            .inner
            .conn
            .execute("DELETE FROM records WHERE key = ?1", params![key])
            .await
            .map_err(|e| StoreError::Backend(format!("remove: {e}")))?;

        if count > 0 {
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
