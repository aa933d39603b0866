use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use ck_api_types::{ChainId, WalletAddress, WalletId, WalletMetadata};
use ck_crypto::{DeviceKey, Signer, decrypt_key_material, encrypt_key_material};
use ck_storage::{ScopedStorage, WalletStorage};
use ck_wallet_core::{ConnectOptions, CreateOptions, Wallet, WalletConfig, WalletError};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use zeroize::Zeroize;

pub const LOCAL_WALLET_ID: &str = "local";

const ENCRYPTED_KEY: &str = "encryptedKey";

pub fn local_wallet_config(password: impl Into<String>) -> WalletConfig {
    let password = password.into();
    WalletConfig::personal(
        LOCAL_WALLET_ID,
        WalletMetadata {
            name: "Guest Wallet".to_owned(),
            icon_url: "https://assets.connectkit.dev/wallets/local.svg".to_owned(),
        },
        move |options: CreateOptions| -> Result<Arc<dyn Wallet>, WalletError> {
            Ok(Arc::new(LocalWallet::new(options, password.clone())?))
        },
    )
}

#[derive(Default)]
struct LocalState {
    key: Option<DeviceKey>,
    chain_id: Option<ChainId>,
}

/// Wallet whose key is generated and kept on this device, encrypted with a
/// password in wallet storage.
pub struct LocalWallet {
    id: WalletId,
    storage: ScopedStorage,
    password: String,
    default_chain: ChainId,
    state: RwLock<LocalState>,
}

impl LocalWallet {
    pub fn new(options: CreateOptions, password: String) -> Result<Self, WalletError> {
        if password.trim().is_empty() {
            return Err(WalletError::Config("local wallet password cannot be empty".to_owned()));
        }

        Ok(Self {
            id: WalletId::new(LOCAL_WALLET_ID),
            storage: options.storage,
            password,
            default_chain: options.chain_id,
            state: RwLock::new(LocalState::default()),
        })
    }

    async fn load_or_generate(&self) -> Result<DeviceKey, WalletError> {
        if let Some(stored) = self.storage.get_item(ENCRYPTED_KEY).await? {
            let encrypted = STANDARD
                .decode(stored.as_bytes())
                .map_err(|err| anyhow::anyhow!("stored local wallet key is corrupted: {err}"))?;
            let mut secret = decrypt_key_material(&encrypted, &self.password)?;
            let key = DeviceKey::from_secret_key_bytes(secret);
            secret.zeroize();
            return Ok(key);
        }

        let key = DeviceKey::generate();
        let mut secret = key.secret_key_bytes();
        let encrypted = encrypt_key_material(&secret, &self.password);
        secret.zeroize();
        let encrypted = encrypted?;
        self.storage
            .set_item(ENCRYPTED_KEY, &STANDARD.encode(encrypted))
            .await?;
        info!("generated new local wallet {}", key.address());
        Ok(key)
    }
}

#[async_trait]
impl Wallet for LocalWallet {
    fn wallet_id(&self) -> &WalletId {
        &self.id
    }

    async fn connect(&self, options: &ConnectOptions) -> Result<WalletAddress, WalletError> {
        let key = self.load_or_generate().await?;
        let address = WalletAddress::new(key.address());

        let mut state = self.state.write().await;
        state.key = Some(key);
        state.chain_id = Some(options.chain_id.unwrap_or(self.default_chain));
        Ok(address)
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        let mut state = self.state.write().await;
        state.key = None;
        state.chain_id = None;
        Ok(())
    }

    async fn address(&self) -> Option<WalletAddress> {
        let state = self.state.read().await;
        state.key.as_ref().map(|key| WalletAddress::new(key.address()))
    }

    async fn chain_id(&self) -> Option<ChainId> {
        self.state.read().await.chain_id
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), WalletError> {
        let mut state = self.state.write().await;
        if state.key.is_none() {
            return Err(WalletError::NotConnected);
        }
        state.chain_id = Some(chain_id);
        Ok(())
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, WalletError> {
        let state = self.state.read().await;
        let key = state.key.as_ref().ok_or(WalletError::NotConnected)?;
        Ok(key.sign(message)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ck_storage::InMemoryStorage;

    fn create_options(storage: Arc<InMemoryStorage>) -> CreateOptions {
        CreateOptions {
            chain_id: ChainId(1),
            storage: ScopedStorage::new(storage, LOCAL_WALLET_ID),
            personal_wallet: None,
        }
    }

    #[tokio::test]
    async fn reconnect_restores_the_same_key() -> anyhow::Result<()> {
        let storage = Arc::new(InMemoryStorage::new());
        let config = local_wallet_config("device-secret");

        let first = config.create(create_options(storage.clone()))?;
        let address = first.connect(&ConnectOptions::default()).await?;
        first.disconnect().await?;
        assert!(first.address().await.is_none());

        let second = config.create(create_options(storage.clone()))?;
        let restored = second.connect(&ConnectOptions::with_chain(ChainId(137))).await?;

        assert_eq!(address, restored);
        assert_eq!(second.chain_id().await, Some(ChainId(137)));
        assert_eq!(storage.keys().await, vec!["__CK__/local/encryptedKey".to_owned()]);
        Ok(())
    }

    #[tokio::test]
    async fn wrong_password_fails_to_connect() -> anyhow::Result<()> {
        let storage = Arc::new(InMemoryStorage::new());
        local_wallet_config("right")
            .create(create_options(storage.clone()))?
            .connect(&ConnectOptions::default())
            .await?;

        let wallet = local_wallet_config("wrong").create(create_options(storage))?;
        let err = wallet.connect(&ConnectOptions::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "incorrect password");
        assert!(wallet.address().await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn empty_password_is_a_configuration_error() {
        let storage = Arc::new(InMemoryStorage::new());
        let result = local_wallet_config("  ").create(create_options(storage));
        assert!(matches!(result, Err(WalletError::Config(_))));
    }

    #[tokio::test]
    async fn signing_requires_connection() -> anyhow::Result<()> {
        let storage = Arc::new(InMemoryStorage::new());
        let wallet = local_wallet_config("secret").create(create_options(storage))?;
        assert!(matches!(wallet.sign_message(b"hi").await, Err(WalletError::NotConnected)));

        wallet.connect(&ConnectOptions::default()).await?;
        assert_eq!(wallet.sign_message(b"hi").await?.len(), 64);
        Ok(())
    }
}
