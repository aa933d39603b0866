use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[cfg(target_arch = "wasm32")]
mod browser;
#[cfg(not(target_arch = "wasm32"))]
mod rocks;

#[cfg(target_arch = "wasm32")]
pub use browser::BrowserStorage;
#[cfg(not(target_arch = "wasm32"))]
pub use rocks::RocksDbStorage;

/// Prefix shared by every persisted key.
pub const KEY_PREFIX: &str = "__CK__";

/// Key/value store handed to wallets for persisting selection metadata.
#[async_trait]
pub trait WalletStorage: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>>;
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;
    async fn remove_item(&self, key: &str) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryStorage {
    items: RwLock<HashMap<String, String>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn keys(&self) -> Vec<String> {
        let guard = self.items.read().await;
        let mut keys: Vec<String> = guard.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl WalletStorage for InMemoryStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let guard = self.items.read().await;
        Ok(guard.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut guard = self.items.write().await;
        guard.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        let mut guard = self.items.write().await;
        guard.remove(key);
        Ok(())
    }
}

/// Namespaces keys as `"{KEY_PREFIX}/{scope}/{key}"` on top of another store.
#[derive(Clone)]
pub struct ScopedStorage {
    inner: Arc<dyn WalletStorage>,
    scope: String,
}

impl ScopedStorage {
    pub fn new(inner: Arc<dyn WalletStorage>, scope: impl Into<String>) -> Self {
        Self {
            inner,
            scope: scope.into(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn full_key(&self, key: &str) -> String {
        storage_key(&self.scope, key)
    }
}

pub fn storage_key(scope: &str, key: &str) -> String {
    format!("{KEY_PREFIX}/{scope}/{key}")
}

#[async_trait]
impl WalletStorage for ScopedStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.inner.get_item(&self.full_key(key)).await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.inner.set_item(&self.full_key(key), value).await
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.inner.remove_item(&self.full_key(key)).await
    }
}

pub async fn load_json<T: DeserializeOwned>(
    storage: &dyn WalletStorage,
    key: &str,
) -> Result<Option<T>> {
    match storage.get_item(key).await? {
        Some(raw) => {
            let value = serde_json::from_str(&raw)
                .with_context(|| format!("malformed json at {key}"))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

pub async fn save_json<T: Serialize>(
    storage: &dyn WalletStorage,
    key: &str,
    value: &T,
) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    storage.set_item(key, &raw).await
}
