use anyhow::{Context, Result};
use async_trait::async_trait;
use ck_api_types::{ChainId, WalletAddress, WalletId, WalletMetadata};
use ck_wallet_core::{
    ConnectOptions, CreateOptions, Wallet, WalletConfig, WalletError, WrapperFlavor,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::remote_error;

pub const SMART_WALLET_ID: &str = "smart";

/// Resolves and deploys smart-account contracts owned by a personal wallet.
#[async_trait]
pub trait AccountFactory: Send + Sync {
    async fn account_address(
        &self,
        owner: &WalletAddress,
        chain_id: ChainId,
    ) -> Result<WalletAddress>;
    async fn is_deployed(&self, account: &WalletAddress, chain_id: ChainId) -> Result<bool>;
    async fn deploy(&self, owner: &WalletAddress, chain_id: ChainId) -> Result<WalletAddress>;
}

/// HTTP client for an account-factory service.
///
/// Reads `CONNECT_ACCOUNT_FACTORY_URL` when no endpoint is given
/// (default: `http://localhost:3100`).
pub struct HttpAccountFactory {
    endpoint: String,
    factory_address: String,
    http: reqwest::Client,
}

impl HttpAccountFactory {
    pub fn new(endpoint: Option<String>, factory_address: impl Into<String>) -> Self {
        let endpoint = endpoint
            .or_else(|| std::env::var("CONNECT_ACCOUNT_FACTORY_URL").ok())
            .unwrap_or_else(|| "http://localhost:3100".to_owned());
        Self {
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            factory_address: factory_address.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    address: String,
    #[serde(default)]
    deployed: bool,
}

#[derive(Debug, Serialize)]
struct DeployRequest<'a> {
    factory: &'a str,
    owner: &'a str,
    chain_id: u64,
}

impl HttpAccountFactory {
    async fn fetch_account(
        &self,
        owner: &WalletAddress,
        chain_id: ChainId,
    ) -> Result<AccountResponse> {
        let url = format!(
            "{}/accounts/{}/{}?chain_id={}",
            self.endpoint, self.factory_address, owner, chain_id
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("account factory lookup transport")?;

        if !response.status().is_success() {
            return Err(remote_error("account factory lookup", response).await);
        }

        response.json().await.context("account factory lookup parse")
    }
}

#[async_trait]
impl AccountFactory for HttpAccountFactory {
    async fn account_address(
        &self,
        owner: &WalletAddress,
        chain_id: ChainId,
    ) -> Result<WalletAddress> {
        let body = self.fetch_account(owner, chain_id).await?;
        Ok(WalletAddress::new(body.address))
    }

    async fn is_deployed(&self, account: &WalletAddress, chain_id: ChainId) -> Result<bool> {
        let url = format!("{}/accounts/{}/deployed?chain_id={}", self.endpoint, account, chain_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("account deployment lookup transport")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(remote_error("account deployment lookup", response).await);
        }

        let body: AccountResponse =
            response.json().await.context("account deployment lookup parse")?;
        Ok(body.deployed)
    }

    async fn deploy(&self, owner: &WalletAddress, chain_id: ChainId) -> Result<WalletAddress> {
        let url = format!("{}/accounts/deploy", self.endpoint);
        let response = self
            .http
            .post(&url)
            .json(&DeployRequest {
                factory: &self.factory_address,
                owner: owner.as_str(),
                chain_id: chain_id.0,
            })
            .send()
            .await
            .context("account deploy transport")?;

        if !response.status().is_success() {
            return Err(remote_error("account deploy", response).await);
        }

        let body: AccountResponse = response.json().await.context("account deploy parse")?;
        Ok(WalletAddress::new(body.address))
    }
}

pub fn smart_wallet_config(
    personal_wallets: Vec<WalletConfig>,
    factory: Arc<dyn AccountFactory>,
    deploy_on_connect: bool,
) -> WalletConfig {
    WalletConfig::wrapper(
        SMART_WALLET_ID,
        WalletMetadata {
            name: "Smart Wallet".to_owned(),
            icon_url: "https://assets.connectkit.dev/wallets/smart.svg".to_owned(),
        },
        WrapperFlavor::SmartAccount,
        personal_wallets,
        move |options: CreateOptions| -> Result<Arc<dyn Wallet>, WalletError> {
            let personal = options
                .personal_wallet
                .ok_or_else(|| WalletError::MissingPersonalWallet(WalletId::new(SMART_WALLET_ID)))?;
            Ok(Arc::new(SmartWallet {
                id: WalletId::new(SMART_WALLET_ID),
                personal,
                factory: factory.clone(),
                deploy_on_connect,
                default_chain: options.chain_id,
                state: RwLock::new(SmartState::default()),
            }))
        },
    )
}

#[derive(Default)]
struct SmartState {
    account: Option<WalletAddress>,
    chain_id: Option<ChainId>,
}

/// Smart-contract account controlled by a personal wallet.
pub struct SmartWallet {
    id: WalletId,
    personal: Arc<dyn Wallet>,
    factory: Arc<dyn AccountFactory>,
    deploy_on_connect: bool,
    default_chain: ChainId,
    state: RwLock<SmartState>,
}

impl SmartWallet {
    async fn resolve_account(
        &self,
        owner: &WalletAddress,
        chain_id: ChainId,
    ) -> Result<WalletAddress, WalletError> {
        let account = self.factory.account_address(owner, chain_id).await?;
        if self.deploy_on_connect && !self.factory.is_deployed(&account, chain_id).await? {
            let deployed = self.factory.deploy(owner, chain_id).await?;
            info!("deployed smart account {} on chain {}", deployed, chain_id);
            return Ok(deployed);
        }
        Ok(account)
    }
}

#[async_trait]
impl Wallet for SmartWallet {
    fn wallet_id(&self) -> &WalletId {
        &self.id
    }

    async fn connect(&self, options: &ConnectOptions) -> Result<WalletAddress, WalletError> {
        let owner = self
            .personal
            .address()
            .await
            .ok_or_else(|| WalletError::MissingPersonalWallet(self.id.clone()))?;

        let chain_id = match options.chain_id {
            Some(chain_id) => chain_id,
            None => self.personal.chain_id().await.unwrap_or(self.default_chain),
        };

        let account = self.resolve_account(&owner, chain_id).await?;

        let mut state = self.state.write().await;
        state.account = Some(account.clone());
        state.chain_id = Some(chain_id);
        Ok(account)
    }

    /// Drops the account only; the personal wallet stays connected.
    async fn disconnect(&self) -> Result<(), WalletError> {
        let mut state = self.state.write().await;
        state.account = None;
        state.chain_id = None;
        Ok(())
    }

    async fn address(&self) -> Option<WalletAddress> {
        self.state.read().await.account.clone()
    }

    async fn chain_id(&self) -> Option<ChainId> {
        self.state.read().await.chain_id
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), WalletError> {
        if self.address().await.is_none() {
            return Err(WalletError::NotConnected);
        }
        let owner = self.personal.address().await.ok_or(WalletError::NotConnected)?;
        self.personal.switch_chain(chain_id).await?;
        let account = self.resolve_account(&owner, chain_id).await?;

        let mut state = self.state.write().await;
        state.account = Some(account);
        state.chain_id = Some(chain_id);
        Ok(())
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, WalletError> {
        if self.address().await.is_none() {
            return Err(WalletError::NotConnected);
        }
        self.personal.sign_message(message).await
    }

    fn personal_wallet(&self) -> Option<Arc<dyn Wallet>> {
        Some(self.personal.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ck_storage::{InMemoryStorage, ScopedStorage};
    use ck_wallet_core::mock::MockFactory;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct StubFactory {
        deployed: bool,
        deploys: AtomicUsize,
    }

    #[async_trait]
    impl AccountFactory for StubFactory {
        async fn account_address(
            &self,
            owner: &WalletAddress,
            chain_id: ChainId,
        ) -> Result<WalletAddress> {
            Ok(WalletAddress::new(format!("sa:{}:{}", owner, chain_id)))
        }

        async fn is_deployed(&self, _account: &WalletAddress, _chain_id: ChainId) -> Result<bool> {
            Ok(self.deployed)
        }

        async fn deploy(&self, owner: &WalletAddress, chain_id: ChainId) -> Result<WalletAddress> {
            self.deploys.fetch_add(1, Ordering::SeqCst);
            Ok(WalletAddress::new(format!("sa:{}:{}", owner, chain_id)))
        }
    }

    fn create_options(personal: Option<Arc<dyn Wallet>>) -> CreateOptions {
        CreateOptions {
            chain_id: ChainId(1),
            storage: ScopedStorage::new(Arc::new(InMemoryStorage::new()), SMART_WALLET_ID),
            personal_wallet: personal,
        }
    }

    async fn connected_personal() -> anyhow::Result<Arc<dyn Wallet>> {
        let personal = MockFactory::resolving("wallet-a", "0xDEF")
            .config()
            .create(create_options(None))?;
        personal.connect(&ConnectOptions::with_chain(ChainId(137))).await?;
        Ok(personal)
    }

    #[tokio::test]
    async fn creation_requires_personal_wallet() {
        let config = smart_wallet_config(vec![], Arc::new(StubFactory::default()), false);
        let result = config.create(create_options(None));
        assert!(matches!(result, Err(WalletError::MissingPersonalWallet(_))));
    }

    #[tokio::test]
    async fn account_follows_personal_chain() -> anyhow::Result<()> {
        let personal = connected_personal().await?;
        let factory = Arc::new(StubFactory::default());
        let config = smart_wallet_config(vec![], factory.clone(), false);
        let wallet = config.create(create_options(Some(personal.clone())))?;

        let account = wallet.connect(&ConnectOptions::default()).await?;
        assert_eq!(account.as_str(), "sa:0xDEF:137");
        assert_eq!(factory.deploys.load(Ordering::SeqCst), 0);

        wallet.disconnect().await?;
        assert!(wallet.address().await.is_none());
        assert_eq!(personal.address().await, Some(WalletAddress::new("0xDEF")));
        Ok(())
    }

    #[tokio::test]
    async fn deploys_undeployed_accounts_when_asked() -> anyhow::Result<()> {
        let personal = connected_personal().await?;
        let factory = Arc::new(StubFactory::default());
        let wallet = smart_wallet_config(vec![], factory.clone(), true)
            .create(create_options(Some(personal)))?;

        wallet.connect(&ConnectOptions::with_chain(ChainId(8453))).await?;
        assert_eq!(factory.deploys.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn switching_chain_moves_both_wallets() -> anyhow::Result<()> {
        let personal = connected_personal().await?;
        let wallet = smart_wallet_config(vec![], Arc::new(StubFactory::default()), false)
            .create(create_options(Some(personal.clone())))?;
        wallet.connect(&ConnectOptions::default()).await?;

        wallet.switch_chain(ChainId(8453)).await?;
        assert_eq!(wallet.chain_id().await, Some(ChainId(8453)));
        assert_eq!(personal.chain_id().await, Some(ChainId(8453)));
        assert_eq!(wallet.address().await, Some(WalletAddress::new("sa:0xDEF:8453")));
        Ok(())
    }

    #[tokio::test]
    async fn disconnected_personal_blocks_connect() -> anyhow::Result<()> {
        let personal = connected_personal().await?;
        let wallet = smart_wallet_config(vec![], Arc::new(StubFactory::default()), false)
            .create(create_options(Some(personal.clone())))?;
        personal.disconnect().await?;

        let err = wallet.connect(&ConnectOptions::default()).await.unwrap_err();
        assert!(matches!(err, WalletError::MissingPersonalWallet(_)));
        Ok(())
    }
}
