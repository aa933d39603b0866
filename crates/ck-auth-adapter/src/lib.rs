mod inflight;
mod token;

use anyhow::{Result, anyhow};
use ck_api_types::{ChainId, WalletAddress};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub use inflight::InFlightCache;
pub use token::{AuthError, AuthToken, AuthTokenCache, HttpTokenIssuer, TokenIssuer};

/// Sign-in message a wallet signs to prove control of its address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginPayload {
    pub domain: String,
    pub address: WalletAddress,
    pub chain_id: Option<ChainId>,
    pub nonce: String,
    pub issued_at_epoch_ms: u128,
    pub expires_at_epoch_ms: u128,
}

impl LoginPayload {
    pub fn message(&self) -> String {
        let mut message = format!(
            "{} wants you to sign in with your account:\n{}\n\n",
            self.domain, self.address
        );
        message.push_str(&format!(
            "Nonce: {}\nIssued At: {}\nExpiration Time: {}",
            self.nonce, self.issued_at_epoch_ms, self.expires_at_epoch_ms
        ));
        if let Some(chain_id) = self.chain_id {
            message.push_str(&format!("\nChain ID: {chain_id}"));
        }
        message
    }
}

pub fn issue_login_payload(
    domain: &str,
    address: &WalletAddress,
    chain_id: Option<ChainId>,
    ttl: Duration,
) -> Result<LoginPayload> {
    if domain.trim().is_empty() {
        return Err(anyhow!("login domain is required"));
    }

    let issued_at_epoch_ms = epoch_ms()?;
    Ok(LoginPayload {
        domain: domain.to_owned(),
        address: address.clone(),
        chain_id,
        nonce: Uuid::new_v4().to_string(),
        issued_at_epoch_ms,
        expires_at_epoch_ms: issued_at_epoch_ms + ttl.as_millis(),
    })
}

pub(crate) fn epoch_ms() -> Result<u128> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|err| anyhow!("time error: {err}"))?
        .as_millis())
}
