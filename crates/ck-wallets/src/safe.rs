use anyhow::{Context, Result};
use async_trait::async_trait;
use ck_api_types::{ChainId, SelectionData, WalletAddress, WalletId, WalletMetadata};
use ck_wallet_core::{
    ConnectOptions, CreateOptions, Wallet, WalletConfig, WalletError, WrapperFlavor,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::remote_error;

pub const SAFE_WALLET_ID: &str = "safe";

#[async_trait]
pub trait SafeService: Send + Sync {
    async fn owners(&self, safe: &WalletAddress, chain_id: ChainId) -> Result<Vec<WalletAddress>>;
}

/// Client for a Safe transaction service (`/api/v1/safes/{address}/`).
pub struct HttpSafeService {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpSafeService {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SafeInfoResponse {
    owners: Vec<String>,
}

#[async_trait]
impl SafeService for HttpSafeService {
    async fn owners(&self, safe: &WalletAddress, chain_id: ChainId) -> Result<Vec<WalletAddress>> {
        let url = format!("{}/api/v1/safes/{}/?chain_id={}", self.endpoint, safe, chain_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("safe service transport")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            anyhow::bail!("Safe {safe} was not found on chain {chain_id}");
        }
        if !response.status().is_success() {
            return Err(remote_error("safe service", response).await);
        }

        let body: SafeInfoResponse = response.json().await.context("safe service parse")?;
        Ok(body.owners.into_iter().map(WalletAddress::new).collect())
    }
}

pub fn safe_wallet_config(
    personal_wallets: Vec<WalletConfig>,
    service: Arc<dyn SafeService>,
) -> WalletConfig {
    WalletConfig::wrapper(
        SAFE_WALLET_ID,
        WalletMetadata {
            name: "Safe".to_owned(),
            icon_url: "https://assets.connectkit.dev/wallets/safe.svg".to_owned(),
        },
        WrapperFlavor::Safe,
        personal_wallets,
        move |options: CreateOptions| -> Result<Arc<dyn Wallet>, WalletError> {
            let personal = options
                .personal_wallet
                .ok_or_else(|| WalletError::MissingPersonalWallet(WalletId::new(SAFE_WALLET_ID)))?;
            Ok(Arc::new(SafeWallet {
                id: WalletId::new(SAFE_WALLET_ID),
                personal,
                service: service.clone(),
                default_chain: options.chain_id,
                state: RwLock::new(SafeState::default()),
            }))
        },
    )
}

#[derive(Default)]
struct SafeState {
    safe: Option<WalletAddress>,
    chain_id: Option<ChainId>,
}

/// Multisig account selected by the user and co-owned by the personal wallet.
pub struct SafeWallet {
    id: WalletId,
    personal: Arc<dyn Wallet>,
    service: Arc<dyn SafeService>,
    default_chain: ChainId,
    state: RwLock<SafeState>,
}

#[async_trait]
impl Wallet for SafeWallet {
    fn wallet_id(&self) -> &WalletId {
        &self.id
    }

    async fn connect(&self, options: &ConnectOptions) -> Result<WalletAddress, WalletError> {
        let SelectionData::SafeAccount { address: safe } = &options.selection else {
            return Err(WalletError::InvalidSelection(self.id.clone()));
        };

        let owner = self
            .personal
            .address()
            .await
            .ok_or_else(|| WalletError::MissingPersonalWallet(self.id.clone()))?;

        let chain_id = match options.chain_id {
            Some(chain_id) => chain_id,
            None => self.personal.chain_id().await.unwrap_or(self.default_chain),
        };

        let owners = self.service.owners(safe, chain_id).await?;
        let is_owner = owners
            .iter()
            .any(|candidate| candidate.as_str().eq_ignore_ascii_case(owner.as_str()));
        if !is_owner {
            return Err(WalletError::Sdk(format!("{owner} is not an owner of Safe {safe}")));
        }

        info!("selected Safe {} on chain {}", safe, chain_id);
        let mut state = self.state.write().await;
        state.safe = Some(safe.clone());
        state.chain_id = Some(chain_id);
        Ok(safe.clone())
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        let mut state = self.state.write().await;
        state.safe = None;
        state.chain_id = None;
        Ok(())
    }

    async fn address(&self) -> Option<WalletAddress> {
        self.state.read().await.safe.clone()
    }

    async fn chain_id(&self) -> Option<ChainId> {
        self.state.read().await.chain_id
    }

    /// A Safe lives on the chain it was selected on.
    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), WalletError> {
        let state = self.state.read().await;
        match state.chain_id {
            None => Err(WalletError::NotConnected),
            Some(current) if current == chain_id => Ok(()),
            Some(_) => Err(WalletError::UnsupportedChain(chain_id)),
        }
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
