//! The durable authentication summary.
//!
//! The record is a cache of hints. It is stored as separate keys so the
//! GitHub adapter can own the access-token key while the reconciler owns the
//! rest. Nothing read from here ever makes the wallet count as connected.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreError;
use crate::store::Store;

pub const GITHUB_TOKEN_KEY: &str = "github_access_token";
pub const GITHUB_USER_KEY: &str = "github_user";
pub const WALLET_HINT_KEY: &str = "wallet_address";
pub const AUTH_COMPLETE_KEY: &str = "auth_complete";
pub const LAST_CHECKED_KEY: &str = "auth_last_checked_at";

/// Which part of the record a disconnect clears.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClearScope {
    Wallet,
    GitHub,
    All,
}

impl ClearScope {
    /// Every scope drops the completion flag, since auth is no longer complete.
    pub fn keys(&self) -> &'static [&'static str] {
        match self {
            ClearScope::Wallet => &[WALLET_HINT_KEY, AUTH_COMPLETE_KEY],
            ClearScope::GitHub => &[GITHUB_TOKEN_KEY, GITHUB_USER_KEY, AUTH_COMPLETE_KEY],
            ClearScope::All => &[
                GITHUB_TOKEN_KEY,
                GITHUB_USER_KEY,
                WALLET_HINT_KEY,
                AUTH_COMPLETE_KEY,
                LAST_CHECKED_KEY,
            ],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClearScope::Wallet => "wallet",
            ClearScope::GitHub => "github",
            ClearScope::All => "all",
        }
    }
}

/// Shape of the serialized GitHub user entry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
struct StoredGitHubUser {
    login: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedAuthRecord {
    pub github_identifier: Option<String>,
    pub github_metadata: Option<HashMap<String, String>>,
    /// Opaque; only its presence is ever looked at.
    pub github_access_token: Option<String>,
    pub wallet_address_hint: Option<String>,
    pub auth_complete_flag: Option<bool>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl PersistedAuthRecord {
    /// Whether the record is enough to optimistically show GitHub as linked.
    pub fn can_seed_github(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.github_access_token) && present(&self.github_identifier)
    }

    /// Reads every key. A key that fails to load or parse is treated as absent.
    pub async fn load(store: &dyn Store) -> Self {
        let user = read_key(store, GITHUB_USER_KEY)
            .await
            .and_then(|raw| match serde_json::from_str::<StoredGitHubUser>(&raw) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!("Ignoring unreadable '{}' entry: {}", GITHUB_USER_KEY, e);
                    None
                }
            });

        PersistedAuthRecord {
            github_identifier: user.as_ref().map(|u| u.login.clone()),
            github_metadata: user
                .map(|u| u.metadata)
                .filter(|metadata| !metadata.is_empty()),
            github_access_token: read_key(store, GITHUB_TOKEN_KEY).await,
            wallet_address_hint: read_key(store, WALLET_HINT_KEY).await,
            auth_complete_flag: read_key(store, AUTH_COMPLETE_KEY)
                .await
                .and_then(|raw| raw.parse::<bool>().ok()),
            last_checked_at: read_key(store, LAST_CHECKED_KEY)
                .await
                .and_then(|raw| parse_timestamp(&raw)),
        }
    }

    /// Writes the completion summary. The access token is left alone: it is
    /// owned by the GitHub identity source.
    pub async fn save_completion(&self, store: &dyn Store) -> Result<(), StoreError> {
        if let Some(login) = &self.github_identifier {
            let user = StoredGitHubUser {
                login: login.clone(),
                metadata: self.github_metadata.clone().unwrap_or_default(),
            };
            let raw = serde_json::to_string(&user)
                .map_err(|e| StoreError::Backend(format!("Failed to encode user: {}", e)))?;
            store.set(GITHUB_USER_KEY, &raw).await?;
        }
        if let Some(address) = &self.wallet_address_hint {
            store.set(WALLET_HINT_KEY, address).await?;
        }
        if let Some(flag) = self.auth_complete_flag {
            store.set(AUTH_COMPLETE_KEY, &flag.to_string()).await?;
        }
        if let Some(checked) = self.last_checked_at {
            store.set(LAST_CHECKED_KEY, &checked.to_rfc3339()).await?;
        }
        Ok(())
    }

    /// Removes every key of the scope, even after a failure; returns the first
    /// failure.
    pub async fn clear(store: &dyn Store, scope: ClearScope) -> Result<(), StoreError> {
        let mut first_error = None;
        for key in scope.keys() {
            if let Err(e) = store.remove(key).await {
                warn!("Failed to remove '{}' from the store: {}", key, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn read_key(store: &dyn Store, key: &str) -> Option<String> {
    match store.get(key).await {
        Ok(value) => value,
        Err(e) => {
            warn!("Failed to read '{}' from the store: {}", key, e);
            None
        }
    }
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// A record is stale when it was never checked or was checked longer than
/// `max_age` ago.
pub fn is_stale(last_checked_at: Option<DateTime<Utc>>, max_age: Duration, now: DateTime<Utc>) -> bool {
    let Some(checked) = last_checked_at else {
        return true;
    };
    let max_age = TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX);
    now.signed_duration_since(checked) > max_age
}
