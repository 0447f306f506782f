//! Local account-state cache.
//!
//! Persists what the onboarding flow and past validations learned about
//! each (user, platform) pair: an accessed flag, the connected username,
//! competitors, account type, plus raw JSON records that serve as backfill
//! sources when the primary username key is missing. Reads tolerate
//! corruption per key, so one bad record never poisons its siblings.
//! Writes merge; nothing here is ever destructive except [`LocalStateCache::reset`].

pub mod keys;
pub mod kv;
mod libsql_store;

pub use kv::{KeyValueStore, MemoryStore, StoreEvent};
pub use libsql_store::LibSqlStore;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::platform::Platform;
use crate::status::ProcessingState;

/// Whether the account was onboarded as a brand or an individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountType {
    Branding,
    #[default]
    NonBranding,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Branding => "branding",
            AccountType::NonBranding => "non-branding",
        }
    }

    pub fn parse(s: &str) -> Option<AccountType> {
        match s {
            "branding" => Some(AccountType::Branding),
            "non-branding" => Some(AccountType::NonBranding),
            _ => None,
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Cached account state for one (user, platform) pair.
///
/// Eventually consistent with the backend; the backend wins on conflict.
/// An empty `account_holder` means unknown. It is never defaulted to a
/// placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub platform: Platform,
    pub account_holder: String,
    pub competitors: Vec<String>,
    pub account_type: AccountType,
    pub accessed: bool,
}

impl AccountState {
    pub fn empty(platform: Platform) -> Self {
        Self {
            platform,
            account_holder: String::new(),
            competitors: Vec::new(),
            account_type: AccountType::default(),
            accessed: false,
        }
    }

    /// Whether the cached state alone justifies optimistic access when
    /// the backend cannot be reached.
    pub fn grants_access(&self) -> bool {
        self.accessed || !self.account_holder.is_empty()
    }
}

/// Merge patch for [`LocalStateCache::apply`]. `None` fields are left
/// untouched in the store.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub account_holder: Option<String>,
    pub competitors: Option<Vec<String>>,
    pub account_type: Option<AccountType>,
    pub accessed: Option<bool>,
}

impl AccountUpdate {
    pub fn accessed(flag: bool) -> Self {
        Self {
            accessed: Some(flag),
            ..Default::default()
        }
    }

    pub fn with_account_holder(mut self, name: impl Into<String>) -> Self {
        self.account_holder = Some(name.into());
        self
    }

    pub fn with_competitors(mut self, competitors: Vec<String>) -> Self {
        self.competitors = Some(competitors);
        self
    }

    pub fn with_account_type(mut self, account_type: AccountType) -> Self {
        self.account_type = Some(account_type);
        self
    }
}

/// Raw account record written by the onboarding flow. Only the username
/// participates in backfill; other fields are ignored.
#[derive(Debug, Deserialize)]
struct RawAccountRecord {
    username: Option<String>,
}

/// Last observed processing window, kept as a backfill source.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessingRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    platform: String,
    start_time: i64,
    end_time: i64,
}

/// Account-state cache over the injected key-value store.
pub struct LocalStateCache {
    store: Arc<dyn KeyValueStore>,
}

impl LocalStateCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Read the cached account state, backfilling a missing username from
    /// lower-priority records. Successful backfills are written through
    /// to the primary key so future reads converge without re-deriving.
    pub async fn get(&self, user: &str, platform: Platform) -> AccountState {
        let mut state = AccountState::empty(platform);

        state.accessed = self.read_flag(&keys::accessed(user, platform)).await;

        state.account_holder = match self.read_string(&keys::username(user, platform)).await {
            Some(name) if !name.is_empty() => name,
            _ => self
                .backfill_username(user, platform)
                .await
                .unwrap_or_default(),
        };

        if let Some(list) = self
            .read_json::<Vec<String>>(&keys::competitors(user, platform))
            .await
        {
            state.competitors = list;
        }

        if let Some(raw) = self.read_string(&keys::account_type(user, platform)).await {
            match AccountType::parse(&raw) {
                Some(kind) => state.account_type = kind,
                None => {
                    warn!(platform = %platform, value = %raw, "Unknown account type in cache, treating as absent")
                }
            }
        }

        state
    }

    /// Merge an update into the store. Untouched fields keep their values.
    pub async fn apply(
        &self,
        user: &str,
        platform: Platform,
        update: AccountUpdate,
    ) -> Result<(), StoreError> {
        if let Some(name) = update.account_holder {
            self.store
                .set(&keys::username(user, platform), &name)
                .await?;
        }
        if let Some(list) = update.competitors {
            let json = serde_json::to_string(&list)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            self.store
                .set(&keys::competitors(user, platform), &json)
                .await?;
        }
        if let Some(kind) = update.account_type {
            self.store
                .set(&keys::account_type(user, platform), kind.as_str())
                .await?;
        }
        if let Some(flag) = update.accessed {
            self.store
                .set(
                    &keys::accessed(user, platform),
                    if flag { "true" } else { "false" },
                )
                .await?;
        }
        Ok(())
    }

    /// Record a freshly observed processing window: the raw record for
    /// later backfill, and the countdown key other sessions watch. A
    /// username already present in the old record is carried over.
    pub async fn record_processing(
        &self,
        user: &str,
        platform: Platform,
        window: &ProcessingState,
    ) -> Result<(), StoreError> {
        let key = keys::processing_info(user, platform);

        let prior = self
            .read_json::<ProcessingRecord>(&key)
            .await
            .and_then(|r| r.username)
            .filter(|u| !u.is_empty());
        let username = match prior {
            Some(name) => Some(name),
            None => self
                .read_string(&keys::username(user, platform))
                .await
                .filter(|u| !u.is_empty()),
        };

        let record = ProcessingRecord {
            username,
            platform: platform.as_str().to_string(),
            start_time: window.start_time.timestamp_millis(),
            end_time: window.end_time.timestamp_millis(),
        };
        let json =
            serde_json::to_string(&record).map_err(|e| StoreError::Backend(e.to_string()))?;
        self.store.set(&key, &json).await?;

        self.store
            .set(
                &keys::processing_countdown(platform),
                &window.end_time.timestamp_millis().to_string(),
            )
            .await?;
        Ok(())
    }

    /// Explicit account reset: removes every record for the user across
    /// all platforms. Nothing else ever clears the cache.
    pub async fn reset(&self, user: &str) -> Result<(), StoreError> {
        for platform in Platform::ALL {
            for key in [
                keys::accessed(user, platform),
                keys::username(user, platform),
                keys::competitors(user, platform),
                keys::account_type(user, platform),
                keys::account_data(user, platform),
                keys::processing_info(user, platform),
            ] {
                self.store.remove(&key).await?;
            }
        }
        Ok(())
    }

    /// Username backfill chain: raw account data first, then the last
    /// processing record.
    async fn backfill_username(&self, user: &str, platform: Platform) -> Option<String> {
        let from_account = self
            .read_json::<RawAccountRecord>(&keys::account_data(user, platform))
            .await
            .and_then(|r| r.username)
            .filter(|u| !u.is_empty());

        let (source, name) = match from_account {
            Some(name) => ("account_data", name),
            None => {
                let name = self
                    .read_json::<ProcessingRecord>(&keys::processing_info(user, platform))
                    .await
                    .and_then(|r| r.username)
                    .filter(|u| !u.is_empty())?;
                ("processing_info", name)
            }
        };

        if let Err(e) = self
            .store
            .set(&keys::username(user, platform), &name)
            .await
        {
            warn!(platform = %platform, error = %e, "Failed to write back backfilled username");
        }
        debug!(platform = %platform, source, "Backfilled username");
        Some(name)
    }

    // ── Tolerant readers ─────────────────────────────────────────────────

    async fn read_string(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Store read failed, treating as absent");
                None
            }
        }
    }

    async fn read_flag(&self, key: &str) -> bool {
        self.read_string(key).await.as_deref() == Some("true")
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.read_string(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Corrupt record in cache, treating as absent");
                None
            }
        }
    }
}
