use ck_api_types::{ChainId, WalletId};

/// Wallet configuration mistakes. These are fatal at startup.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate wallet id: {0}")]
    DuplicateWalletId(WalletId),

    #[error("wrapper wallet {0} has no personal wallets")]
    EmptyPersonalWallets(WalletId),

    #[error("wrapper wallet {wrapper} cannot use wrapper wallet {personal} as a personal wallet")]
    NestedWrapper { wrapper: WalletId, personal: WalletId },
}

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// Message reported by the wallet itself, passed through verbatim.
    #[error("{0}")]
    Sdk(String),

    #[error("wallet is not connected")]
    NotConnected,

    #[error("chain {0} is not supported")]
    UnsupportedChain(ChainId),

    #[error("{0} requires a connected personal wallet")]
    MissingPersonalWallet(WalletId),

    #[error("{0} cannot connect with the given selection")]
    InvalidSelection(WalletId),

    #[error("invalid wallet configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
