mod config;
mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod registry;

use async_trait::async_trait;
use ck_api_types::{ChainId, SelectionData, WalletAddress, WalletId};
use ck_storage::ScopedStorage;
use std::sync::Arc;

pub use config::{WalletConfig, WalletKind, WrapperFlavor};
pub use error::{RegistryError, WalletError};
pub use registry::WalletRegistry;

/// A single wallet session produced by a [`WalletFactory`].
///
/// Implementations wrap whatever SDK actually talks to the wallet; the
/// connection flow only ever sees this trait.
#[async_trait]
pub trait Wallet: Send + Sync {
    fn wallet_id(&self) -> &WalletId;

    /// Runs the wallet's own handshake and returns the connected address.
    async fn connect(&self, options: &ConnectOptions) -> Result<WalletAddress, WalletError>;

    async fn disconnect(&self) -> Result<(), WalletError>;

    async fn address(&self) -> Option<WalletAddress>;

    async fn chain_id(&self) -> Option<ChainId>;

    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), WalletError>;

    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, WalletError>;

    /// The wallet authorizing this one, for wrapper wallets.
    fn personal_wallet(&self) -> Option<Arc<dyn Wallet>> {
        None
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub chain_id: Option<ChainId>,
    pub selection: SelectionData,
}

impl ConnectOptions {
    pub fn with_chain(chain_id: ChainId) -> Self {
        Self {
            chain_id: Some(chain_id),
            selection: SelectionData::None,
        }
    }

    pub fn with_selection(mut self, selection: SelectionData) -> Self {
        self.selection = selection;
        self
    }
}

#[derive(Clone)]
pub struct CreateOptions {
    pub chain_id: ChainId,
    pub storage: ScopedStorage,
    pub personal_wallet: Option<Arc<dyn Wallet>>,
}

pub trait WalletFactory: Send + Sync {
    fn create(&self, options: CreateOptions) -> Result<Arc<dyn Wallet>, WalletError>;
}

impl<F> WalletFactory for F
where
    F: Fn(CreateOptions) -> Result<Arc<dyn Wallet>, WalletError> + Send + Sync,
{
    fn create(&self, options: CreateOptions) -> Result<Arc<dyn Wallet>, WalletError> {
        self(options)
    }
}

/// Identity comparison for wallet handles.
pub fn same_wallet(a: &Arc<dyn Wallet>, b: &Arc<dyn Wallet>) -> bool {
    Arc::ptr_eq(a, b)
}
