//! Wallet connectors offered by the connect flow.
//!
//! `local` and `embedded` are personal wallets; `smart` and `safe` wrap a
//! personal wallet that must already be connected.

mod embedded;
mod local;
mod safe;
mod smart;

pub use embedded::{
    EMBEDDED_WALLET_ID, EmbeddedAuth, EmbeddedLoginRequest, EmbeddedWallet, HttpEmbeddedAuth,
    LastLogin, LoginMethods, embedded_wallet_config,
};
pub use local::{LOCAL_WALLET_ID, LocalWallet, local_wallet_config};
pub use safe::{HttpSafeService, SAFE_WALLET_ID, SafeService, SafeWallet, safe_wallet_config};
pub use smart::{
    AccountFactory, HttpAccountFactory, SMART_WALLET_ID, SmartWallet, smart_wallet_config,
};

#[derive(Debug, serde::Deserialize)]
pub(crate) struct RemoteErrorResponse {
    pub(crate) error: String,
}

/// Turns a non-success HTTP response into an error carrying the remote message.
pub(crate) async fn remote_error(operation: &str, response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<RemoteErrorResponse>(&text) {
        Ok(body) => anyhow::anyhow!(body.error),
        Err(_) => anyhow::anyhow!("{operation} HTTP {status}: {text}"),
    }
}
