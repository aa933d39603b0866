use anyhow::{Result, anyhow};
use async_trait::async_trait;
use gloo_storage::{LocalStorage, Storage};

use crate::WalletStorage;

/// `window.localStorage` backend for wasm builds.
#[derive(Default, Clone, Copy)]
pub struct BrowserStorage;

#[async_trait]
impl WalletStorage for BrowserStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        LocalStorage::raw()
            .get_item(key)
            .map_err(|err| anyhow!("local storage read failed for {key}: {err:?}"))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        LocalStorage::raw()
            .set_item(key, value)
            .map_err(|err| anyhow!("local storage write failed for {key}: {err:?}"))
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        LocalStorage::raw()
            .remove_item(key)
            .map_err(|err| anyhow!("local storage delete failed for {key}: {err:?}"))
    }
}
