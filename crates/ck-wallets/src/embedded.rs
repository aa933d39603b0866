use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use ck_api_types::{ChainId, OAuthProvider, SelectionData, WalletAddress, WalletId, WalletMetadata};
use ck_storage::{ScopedStorage, load_json, save_json};
use ck_wallet_core::{ConnectOptions, CreateOptions, Wallet, WalletConfig, WalletError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::remote_error;

pub const EMBEDDED_WALLET_ID: &str = "embedded";

const LAST_LOGIN_KEY: &str = "lastLogin";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginMethods {
    pub email: bool,
    pub phone: bool,
    pub social: Vec<OAuthProvider>,
}

impl LoginMethods {
    /// Parses a comma separated list such as `email,google,apple`.
    pub fn parse(list: &str) -> Result<Self, WalletError> {
        let mut methods = Self::default();
        for entry in list.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            match entry.to_ascii_lowercase().as_str() {
                "email" => methods.email = true,
                "phone" => methods.phone = true,
                other => {
                    let provider = OAuthProvider::parse(other).ok_or_else(|| {
                        WalletError::Config(format!("unknown login method: {other}"))
                    })?;
                    if !methods.social.contains(&provider) {
                        methods.social.push(provider);
                    }
                }
            }
        }
        Ok(methods)
    }

    pub fn validate(&self) -> Result<(), WalletError> {
        if !self.email && !self.phone && self.social.is_empty() {
            return Err(WalletError::Config(
                "embedded wallet needs an email, phone or social login method".to_owned(),
            ));
        }
        Ok(())
    }

    fn allows(&self, selection: &SelectionData) -> bool {
        match selection {
            SelectionData::Email { .. } => self.email,
            SelectionData::Phone { .. } => self.phone,
            SelectionData::Social { provider, .. } => self.social.contains(provider),
            SelectionData::None | SelectionData::SafeAccount { .. } => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EmbeddedLoginRequest {
    pub client_id: String,
    pub method: String,
    pub identifier: String,
    pub secret: String,
}

impl EmbeddedLoginRequest {
    fn from_selection(client_id: &str, selection: &SelectionData) -> Option<Self> {
        let (method, identifier, secret) = match selection {
            SelectionData::Email { email, code } => {
                ("email".to_owned(), email.clone(), code.clone())
            }
            SelectionData::Phone { phone, code } => {
                ("phone".to_owned(), phone.clone(), code.clone())
            }
            SelectionData::Social { provider, token } => {
                (provider.as_str().to_owned(), provider.as_str().to_owned(), token.clone())
            }
            SelectionData::None | SelectionData::SafeAccount { .. } => return None,
        };
        Some(Self {
            client_id: client_id.to_owned(),
            method,
            identifier,
            secret,
        })
    }
}

/// What the user logged in with last time, so the next connect can prefill it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastLogin {
    pub method: String,
    pub identifier: String,
}

/// Backend that owns the keys of email / phone / social wallets.
#[async_trait]
pub trait EmbeddedAuth: Send + Sync {
    async fn authenticate(&self, request: &EmbeddedLoginRequest) -> Result<WalletAddress>;
    async fn sign(&self, address: &WalletAddress, message: &[u8]) -> Result<Vec<u8>>;
    async fn logout(&self, address: &WalletAddress) -> Result<()>;
}

pub struct HttpEmbeddedAuth {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpEmbeddedAuth {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    address: String,
}

#[derive(Debug, Serialize)]
struct SignRequest<'a> {
    address: &'a str,
    message: String,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    signature: String,
}

#[async_trait]
impl EmbeddedAuth for HttpEmbeddedAuth {
    async fn authenticate(&self, request: &EmbeddedLoginRequest) -> Result<WalletAddress> {
        let url = format!("{}/login", self.endpoint);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .context("embedded wallet login transport")?;

        if !response.status().is_success() {
            return Err(remote_error("embedded wallet login", response).await);
        }

        let body: LoginResponse = response.json().await.context("embedded wallet login parse")?;
        Ok(WalletAddress::new(body.address))
    }

    async fn sign(&self, address: &WalletAddress, message: &[u8]) -> Result<Vec<u8>> {
        let url = format!("{}/sign", self.endpoint);
        let response = self
            .http
            .post(&url)
            .json(&SignRequest {
                address: address.as_str(),
                message: STANDARD.encode(message),
            })
            .send()
            .await
            .context("embedded wallet sign transport")?;

        if !response.status().is_success() {
            return Err(remote_error("embedded wallet sign", response).await);
        }

        let body: SignResponse = response.json().await.context("embedded wallet sign parse")?;
        STANDARD
            .decode(body.signature.as_bytes())
            .context("embedded wallet signature is not base64")
    }

    async fn logout(&self, address: &WalletAddress) -> Result<()> {
        let url = format!("{}/logout", self.endpoint);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "address": address.as_str() }))
            .send()
            .await
            .context("embedded wallet logout transport")?;

        if !response.status().is_success() {
            return Err(remote_error("embedded wallet logout", response).await);
        }
        Ok(())
    }
}

/// Builds the embedded wallet entry. Rejects a configuration with no login method.
pub fn embedded_wallet_config(
    client_id: impl Into<String>,
    methods: LoginMethods,
    auth: Arc<dyn EmbeddedAuth>,
) -> Result<WalletConfig, WalletError> {
    methods.validate()?;
    let client_id = client_id.into();

    Ok(WalletConfig::personal(
        EMBEDDED_WALLET_ID,
        WalletMetadata {
            name: "Email & Social".to_owned(),
            icon_url: "https://assets.connectkit.dev/wallets/embedded.svg".to_owned(),
        },
        move |options: CreateOptions| -> Result<Arc<dyn Wallet>, WalletError> {
            Ok(Arc::new(EmbeddedWallet {
                id: WalletId::new(EMBEDDED_WALLET_ID),
                client_id: client_id.clone(),
                methods: methods.clone(),
                auth: auth.clone(),
                storage: options.storage,
                default_chain: options.chain_id,
                state: RwLock::new(EmbeddedState::default()),
            }))
        },
    )
    .with_select_ui())
}

#[derive(Default)]
struct EmbeddedState {
    address: Option<WalletAddress>,
    chain_id: Option<ChainId>,
}

pub struct EmbeddedWallet {
    id: WalletId,
    client_id: String,
    methods: LoginMethods,
    auth: Arc<dyn EmbeddedAuth>,
    storage: ScopedStorage,
    default_chain: ChainId,
    state: RwLock<EmbeddedState>,
}

impl EmbeddedWallet {
    pub async fn last_login(&self) -> Option<LastLogin> {
        match load_json(&self.storage, LAST_LOGIN_KEY).await {
            Ok(value) => value,
            Err(err) => {
                warn!("failed to read last embedded login: {}", err);
                None
            }
        }
    }
}

#[async_trait]
impl Wallet for EmbeddedWallet {
    fn wallet_id(&self) -> &WalletId {
        &self.id
    }

    async fn connect(&self, options: &ConnectOptions) -> Result<WalletAddress, WalletError> {
        if !self.methods.allows(&options.selection) {
            return Err(WalletError::InvalidSelection(self.id.clone()));
        }
        let request = EmbeddedLoginRequest::from_selection(&self.client_id, &options.selection)
            .ok_or_else(|| WalletError::InvalidSelection(self.id.clone()))?;

        let address = self.auth.authenticate(&request).await?;
        info!("embedded wallet logged in via {}", request.method);

        {
            let mut state = self.state.write().await;
            state.address = Some(address.clone());
            state.chain_id = Some(options.chain_id.unwrap_or(self.default_chain));
        }

        let last = LastLogin {
            method: request.method,
            identifier: request.identifier,
        };
        if let Err(err) = save_json(&self.storage, LAST_LOGIN_KEY, &last).await {
            warn!("failed to persist last embedded login: {}", err);
        }

        Ok(address)
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        let address = {
            let mut state = self.state.write().await;
            state.chain_id = None;
            state.address.take()
        };
        if let Some(address) = address {
            if let Err(err) = self.auth.logout(&address).await {
                warn!("embedded wallet logout failed for {}: {}", address, err);
            }
        }
        Ok(())
    }

    async fn address(&self) -> Option<WalletAddress> {
        self.state.read().await.address.clone()
    }

    async fn chain_id(&self) -> Option<ChainId> {
        self.state.read().await.chain_id
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), WalletError> {
        let mut state = self.state.write().await;
        if state.address.is_none() {
            return Err(WalletError::NotConnected);
        }
        state.chain_id = Some(chain_id);
        Ok(())
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, WalletError> {
        let address = self.address().await.ok_or(WalletError::NotConnected)?;
        Ok(self.auth.sign(&address, message).await?)
    }
}
