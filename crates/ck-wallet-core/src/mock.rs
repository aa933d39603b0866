//! Scriptable wallets for exercising connection flows without an SDK.

use async_trait::async_trait;
use ck_api_types::{ChainId, WalletAddress, WalletId, WalletMetadata};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    ConnectOptions, CreateOptions, Wallet, WalletConfig, WalletError, WalletFactory, WrapperFlavor,
};

#[derive(Debug, Clone)]
pub enum MockBehavior {
    Resolve(WalletAddress),
    Reject(String),
    /// The handshake never completes.
    Hang,
}

#[derive(Clone)]
pub struct MockFactory {
    id: WalletId,
    behavior: Arc<Mutex<MockBehavior>>,
    requires_personal: bool,
    created: Arc<Mutex<Vec<Arc<MockWallet>>>>,
}

impl MockFactory {
    fn new(id: &str, behavior: MockBehavior, requires_personal: bool) -> Self {
        Self {
            id: WalletId::new(id),
            behavior: Arc::new(Mutex::new(behavior)),
            requires_personal,
            created: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn resolving(id: &str, address: &str) -> Self {
        Self::new(id, MockBehavior::Resolve(WalletAddress::new(address)), false)
    }

    pub fn rejecting(id: &str, message: &str) -> Self {
        Self::new(id, MockBehavior::Reject(message.to_owned()), false)
    }

    pub fn hanging(id: &str) -> Self {
        Self::new(id, MockBehavior::Hang, false)
    }

    /// A wrapper wallet that refuses to be created without a personal wallet.
    pub fn wrapper(id: &str, address: &str) -> Self {
        Self::new(id, MockBehavior::Resolve(WalletAddress::new(address)), true)
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        *lock(&self.behavior) = behavior;
    }

    pub fn metadata(&self) -> WalletMetadata {
        WalletMetadata {
            name: format!("{} wallet", self.id),
            icon_url: format!("https://icons.example/{}.svg", self.id),
        }
    }

    pub fn config(&self) -> WalletConfig {
        WalletConfig::personal(self.id.0.clone(), self.metadata(), self.clone())
    }

    pub fn wrapper_config(
        &self,
        flavor: WrapperFlavor,
        personal_wallets: Vec<WalletConfig>,
    ) -> WalletConfig {
        let id = self.id.0.clone();
        WalletConfig::wrapper(id, self.metadata(), flavor, personal_wallets, self.clone())
    }

    pub fn created(&self) -> Vec<Arc<MockWallet>> {
        lock(&self.created).clone()
    }

    pub fn last_created(&self) -> Option<Arc<MockWallet>> {
        lock(&self.created).last().cloned()
    }
}

impl WalletFactory for MockFactory {
    fn create(&self, options: CreateOptions) -> Result<Arc<dyn Wallet>, WalletError> {
        if self.requires_personal && options.personal_wallet.is_none() {
            return Err(WalletError::MissingPersonalWallet(self.id.clone()));
        }

        let wallet = Arc::new(MockWallet {
            id: self.id.clone(),
            behavior: lock(&self.behavior).clone(),
            personal: options.personal_wallet,
            default_chain: options.chain_id,
            state: Mutex::new(MockState::default()),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
        });
        lock(&self.created).push(wallet.clone());
        Ok(wallet)
    }
}

#[derive(Debug, Default)]
struct MockState {
    address: Option<WalletAddress>,
    chain_id: Option<ChainId>,
}

pub struct MockWallet {
    id: WalletId,
    behavior: MockBehavior,
    personal: Option<Arc<dyn Wallet>>,
    default_chain: ChainId,
    state: Mutex<MockState>,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
}

impl MockWallet {
    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).address.is_some()
    }

    pub fn current_address(&self) -> Option<WalletAddress> {
        lock(&self.state).address.clone()
    }
}

#[async_trait]
impl Wallet for MockWallet {
    fn wallet_id(&self) -> &WalletId {
        &self.id
    }

    async fn connect(&self, options: &ConnectOptions) -> Result<WalletAddress, WalletError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(personal) = &self.personal {
            if personal.address().await.is_none() {
                return Err(WalletError::MissingPersonalWallet(self.id.clone()));
            }
        }

        match &self.behavior {
            MockBehavior::Resolve(address) => {
                let mut state = lock(&self.state);
                state.address = Some(address.clone());
                state.chain_id = Some(options.chain_id.unwrap_or(self.default_chain));
                Ok(address.clone())
            }
            MockBehavior::Reject(message) => Err(WalletError::Sdk(message.clone())),
            MockBehavior::Hang => std::future::pending().await,
        }
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = lock(&self.state);
        state.address = None;
        state.chain_id = None;
        Ok(())
    }

    async fn address(&self) -> Option<WalletAddress> {
        lock(&self.state).address.clone()
    }

    async fn chain_id(&self) -> Option<ChainId> {
        lock(&self.state).chain_id
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), WalletError> {
        let mut state = lock(&self.state);
        if state.address.is_none() {
            return Err(WalletError::NotConnected);
        }
        state.chain_id = Some(chain_id);
        Ok(())
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, WalletError> {
        let address = lock(&self.state).address.clone().ok_or(WalletError::NotConnected)?;
        let mut signature = address.0.into_bytes();
        signature.push(b':');
        signature.extend_from_slice(message);
        Ok(signature)
    }

    fn personal_wallet(&self) -> Option<Arc<dyn Wallet>> {
        self.personal.clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
