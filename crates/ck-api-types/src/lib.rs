use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct WalletId(pub String);

impl WalletId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct WalletAddress(pub String);

impl WalletAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId(pub u64);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletMetadata {
    pub name: String,
    pub icon_url: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OAuthProvider {
    Google,
    Apple,
    Facebook,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Apple => "apple",
            Self::Facebook => "facebook",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "google" => Some(Self::Google),
            "apple" => Some(Self::Apple),
            "facebook" => Some(Self::Facebook),
            _ => None,
        }
    }
}

/// Data captured by a connect screen before the wallet's own connect call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionData {
    #[default]
    None,
    Email {
        email: String,
        code: String,
    },
    Phone {
        phone: String,
        code: String,
    },
    Social {
        provider: OAuthProvider,
        token: String,
    },
    SafeAccount {
        address: WalletAddress,
    },
}

// ── Modal configuration ──

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModalSize {
    #[default]
    Wide,
    Compact,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModalTheme {
    #[default]
    Dark,
    Light,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WelcomeScreen {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModalConfig {
    #[serde(default = "default_modal_title")]
    pub title: String,
    #[serde(default)]
    pub theme: ModalTheme,
    #[serde(default)]
    pub size: ModalSize,
    #[serde(default)]
    pub terms_of_service_url: Option<String>,
    #[serde(default)]
    pub privacy_policy_url: Option<String>,
    #[serde(default)]
    pub welcome_screen: Option<WelcomeScreen>,
}

fn default_modal_title() -> String {
    "Connect".to_owned()
}

impl Default for ModalConfig {
    fn default() -> Self {
        Self {
            title: default_modal_title(),
            theme: ModalTheme::default(),
            size: ModalSize::default(),
            terms_of_service_url: None,
            privacy_policy_url: None,
            welcome_screen: None,
        }
    }
}

// ── Service bodies ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletListEntry {
    pub id: WalletId,
    pub metadata: WalletMetadata,
    pub installed: bool,
    pub wrapper: bool,
    #[serde(default)]
    pub personal_wallets: Vec<WalletId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveWalletInfo {
    pub wallet_id: WalletId,
    pub address: WalletAddress,
    pub chain_id: Option<ChainId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub status: ConnectionStatus,
    pub active_wallet: Option<ActiveWalletInfo>,
    pub personal_wallet: Option<ActiveWalletInfo>,
    pub modal_open: bool,
    pub view: String,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModalCloseRequest {
    #[serde(default = "default_true")]
    pub reset: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModalSelectRequest {
    pub wallet_id: WalletId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub wallet_id: WalletId,
    #[serde(default)]
    pub chain_id: Option<ChainId>,
    #[serde(default)]
    pub selection: SelectionData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalConnectRequest {
    pub wrapper_id: WalletId,
    pub personal_wallet_id: WalletId,
    #[serde(default)]
    pub chain_id: Option<ChainId>,
    #[serde(default)]
    pub selection: SelectionData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeRequest {
    pub wrapper_id: WalletId,
    #[serde(default)]
    pub chain_id: Option<ChainId>,
    #[serde(default)]
    pub selection: SelectionData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub outcome: String,
    pub wallet: Option<ActiveWalletInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchChainRequest {
    pub chain_id: ChainId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub address: WalletAddress,
    pub token: String,
    pub expires_at_epoch_ms: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default)]
    pub phase: Option<String>,
}
