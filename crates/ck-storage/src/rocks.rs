use anyhow::{Context, Result};
use async_trait::async_trait;
use rocksdb::{DB, Options};
use std::sync::Arc;
use tracing::info;

use crate::WalletStorage;

/// Disk-backed store for native builds, standing in for browser local storage.
pub struct RocksDbStorage {
    db: Arc<DB>,
}

impl RocksDbStorage {
    pub fn open_default(path: &str) -> Result<Self> {
        let mut options = Options::default();
        options.create_if_missing(true);
        let db = DB::open(&options, path)
            .with_context(|| format!("failed to open storage at {path}"))?;
        info!("wallet storage opened at {}", path);
        Ok(Self { db: Arc::new(db) })
    }
}

#[async_trait]
impl WalletStorage for RocksDbStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let value = self.db.get(key.as_bytes())?;
        match value {
            Some(raw) => Ok(Some(String::from_utf8(raw).context("stored value is not utf-8")?)),
            None => Ok(None),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.db.put(key.as_bytes(), value.as_bytes())?;
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.db.delete(key.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScopedStorage;

    #[tokio::test]
    async fn values_survive_reopen() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("wallets");
        let path = path.to_str().unwrap_or_default().to_owned();

        {
            let storage = Arc::new(RocksDbStorage::open_default(&path)?);
            let scoped = ScopedStorage::new(storage, "local");
            scoped.set_item("encryptedKey", "abc").await?;
        }

        let storage = RocksDbStorage::open_default(&path)?;
        assert_eq!(
            storage.get_item("__CK__/local/encryptedKey").await?.as_deref(),
            Some("abc")
        );

        storage.remove_item("__CK__/local/encryptedKey").await?;
        assert!(storage.get_item("__CK__/local/encryptedKey").await?.is_none());
        Ok(())
    }
}
