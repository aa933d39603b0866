use anyhow::{Context, Result};
use ck_api_types::ChainId;
use ck_wallets::LoginMethods;
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_CLOSE_DELAY_MS: u64 = 250;
const DEFAULT_LOGIN_METHODS: &str = "email,google";
const DEFAULT_LOGIN_DOMAIN: &str = "localhost";
const DEFAULT_FACTORY_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

#[derive(Debug, Clone)]
pub(crate) struct ServiceConfig {
    pub(crate) bind_addr: SocketAddr,
    /// RocksDB directory; wallet storage stays in memory when unset.
    pub(crate) storage_path: Option<String>,
    pub(crate) device_secret: Option<String>,
    pub(crate) embedded_auth_url: Option<String>,
    pub(crate) login_methods: LoginMethods,
    pub(crate) account_factory_url: Option<String>,
    pub(crate) account_factory_address: String,
    pub(crate) safe_service_url: Option<String>,
    pub(crate) auth_url: Option<String>,
    pub(crate) login_domain: String,
    pub(crate) default_chain_id: ChainId,
    pub(crate) close_delay: Duration,
}

impl ServiceConfig {
    pub(crate) fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let value = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let bind_addr = value("CONNECT_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_owned())
            .parse()
            .context("CONNECT_BIND_ADDR must be host:port")?;

        let default_chain_id = match value("CONNECT_DEFAULT_CHAIN_ID") {
            Some(raw) => ChainId(raw.parse().context("CONNECT_DEFAULT_CHAIN_ID must be a number")?),
            None => ck_chain_client::ETHEREUM,
        };

        let close_delay_ms = match value("CONNECT_CLOSE_DELAY_MS") {
            Some(raw) => raw.parse().context("CONNECT_CLOSE_DELAY_MS must be a number")?,
            None => DEFAULT_CLOSE_DELAY_MS,
        };

        let login_methods = LoginMethods::parse(
            &value("CONNECT_LOGIN_METHODS").unwrap_or_else(|| DEFAULT_LOGIN_METHODS.to_owned()),
        )?;

        Ok(Self {
            bind_addr,
            storage_path: value("CONNECT_STORAGE_PATH"),
            device_secret: value("CONNECT_DEVICE_SECRET"),
            embedded_auth_url: value("CONNECT_EMBEDDED_AUTH_URL"),
            login_methods,
            account_factory_url: value("CONNECT_ACCOUNT_FACTORY_URL"),
            account_factory_address: value("CONNECT_ACCOUNT_FACTORY_ADDRESS")
                .unwrap_or_else(|| DEFAULT_FACTORY_ADDRESS.to_owned()),
            safe_service_url: value("CONNECT_SAFE_SERVICE_URL"),
            auth_url: value("CONNECT_AUTH_URL"),
            login_domain: value("CONNECT_LOGIN_DOMAIN")
                .unwrap_or_else(|| DEFAULT_LOGIN_DOMAIN.to_owned()),
            default_chain_id,
            close_delay: Duration::from_millis(close_delay_ms),
        })
    }
}
