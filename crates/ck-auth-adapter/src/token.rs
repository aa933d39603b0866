use anyhow::Context;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use ck_api_types::WalletAddress;
use ck_wallet_core::Wallet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{InFlightCache, LoginPayload, epoch_ms, issue_login_payload};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthToken {
    pub address: WalletAddress,
    pub token: String,
    pub expires_at_epoch_ms: u128,
}

impl AuthToken {
    fn is_valid_at(&self, now_epoch_ms: u128) -> bool {
        now_epoch_ms < self.expires_at_epoch_ms
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("wallet is not connected")]
    NotConnected,

    #[error("{0}")]
    Signing(String),

    #[error("{0}")]
    Issuer(String),
}

/// Exchanges a signed login payload for a session token.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue(&self, payload: &LoginPayload, signature: &[u8]) -> anyhow::Result<AuthToken>;
}

pub struct HttpTokenIssuer {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpTokenIssuer {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    payload: &'a LoginPayload,
    signature: String,
}

#[derive(Debug, Deserialize)]
struct LoginResponseBody {
    token: String,
    expires_at_epoch_ms: u128,
}

#[derive(Debug, Deserialize)]
struct LoginErrorBody {
    error: String,
}

#[async_trait]
impl TokenIssuer for HttpTokenIssuer {
    async fn issue(&self, payload: &LoginPayload, signature: &[u8]) -> anyhow::Result<AuthToken> {
        let url = format!("{}/login", self.endpoint);
        let response = self
            .http
            .post(&url)
            .json(&LoginRequest {
                payload,
                signature: STANDARD.encode(signature),
            })
            .send()
            .await
            .context("auth login transport")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if let Ok(body) = serde_json::from_str::<LoginErrorBody>(&text) {
                anyhow::bail!(body.error);
            }
            anyhow::bail!("auth login HTTP {status}: {text}");
        }

        let body: LoginResponseBody = response.json().await.context("auth login parse")?;
        Ok(AuthToken {
            address: payload.address.clone(),
            token: body.token,
            expires_at_epoch_ms: body.expires_at_epoch_ms,
        })
    }
}

/// Per-address session tokens. Concurrent logins for one address share a
/// single sign-and-issue round trip.
pub struct AuthTokenCache {
    domain: String,
    ttl: Duration,
    issuer: Arc<dyn TokenIssuer>,
    tokens: RwLock<HashMap<WalletAddress, AuthToken>>,
    inflight: InFlightCache<WalletAddress, Result<AuthToken, AuthError>>,
}

impl AuthTokenCache {
    pub fn new(domain: impl Into<String>, ttl: Duration, issuer: Arc<dyn TokenIssuer>) -> Self {
        Self {
            domain: domain.into(),
            ttl,
            issuer,
            tokens: RwLock::new(HashMap::new()),
            inflight: InFlightCache::new(),
        }
    }

    pub async fn token(&self, address: &WalletAddress) -> Option<AuthToken> {
        let now = epoch_ms().unwrap_or_default();
        let tokens = self.tokens.read().await;
        tokens.get(address).filter(|token| token.is_valid_at(now)).cloned()
    }

    pub async fn login(&self, wallet: Arc<dyn Wallet>) -> Result<AuthToken, AuthError> {
        let address = wallet.address().await.ok_or(AuthError::NotConnected)?;
        if let Some(token) = self.token(&address).await {
            debug!("reusing auth token for {}", address);
            return Ok(token);
        }

        let issuer = self.issuer.clone();
        let domain = self.domain.clone();
        let ttl = self.ttl;
        let key = address.clone();
        let result = self
            .inflight
            .get_or_create(key, move || async move {
                let chain_id = wallet.chain_id().await;
                let payload = issue_login_payload(&domain, &address, chain_id, ttl)
                    .map_err(|err| AuthError::Issuer(err.to_string()))?;
                let signature = wallet
                    .sign_message(payload.message().as_bytes())
                    .await
                    .map_err(|err| AuthError::Signing(err.to_string()))?;
                issuer
                    .issue(&payload, &signature)
                    .await
                    .map_err(|err| AuthError::Issuer(err.to_string()))
            })
            .await;

        if let Ok(token) = &result {
            info!("issued auth token for {}", token.address);
            let mut tokens = self.tokens.write().await;
            tokens.insert(token.address.clone(), token.clone());
        }
        result
    }

    pub async fn logout(&self, address: &WalletAddress) {
        let mut tokens = self.tokens.write().await;
        tokens.remove(address);
    }
}
