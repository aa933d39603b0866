use ck_api_types::{ActiveWalletInfo, ChainId, ConnectionStatus, WalletAddress, WalletId};
use ck_chain_client::ChainRegistry;
use ck_storage::{ScopedStorage, WalletStorage, load_json, save_json};
use ck_wallet_core::{ConnectOptions, CreateOptions, Wallet, WalletConfig, same_wallet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Notify, RwLock, broadcast};
use tracing::{debug, info, warn};

use crate::ConnectError;

const SESSION_SCOPE: &str = "session";
const LAST_CONNECTED_KEY: &str = "lastConnectedWallet";
const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StatusChanged(ConnectionStatus),
    Connected {
        wallet_id: WalletId,
        address: WalletAddress,
        chain_id: ChainId,
    },
    Disconnected {
        wallet_id: WalletId,
    },
    ChainChanged {
        wallet_id: WalletId,
        chain_id: ChainId,
    },
}

/// What `auto_connect` needs to restore the previous session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastConnected {
    pub wallet_id: WalletId,
    pub chain_id: ChainId,
    #[serde(default)]
    pub personal_wallet_id: Option<WalletId>,
}

#[derive(Clone)]
pub struct ActiveWallet {
    pub config: Arc<WalletConfig>,
    pub wallet: Arc<dyn Wallet>,
    pub address: WalletAddress,
    pub chain_id: ChainId,
    /// Set when `wallet` is a wrapper authorized by one of its personal wallets.
    pub personal_wallet_id: Option<WalletId>,
}

impl ActiveWallet {
    pub fn wallet_id(&self) -> &WalletId {
        &self.config.id
    }

    pub fn info(&self) -> ActiveWalletInfo {
        ActiveWalletInfo {
            wallet_id: self.config.id.clone(),
            address: self.address.clone(),
            chain_id: Some(self.chain_id),
        }
    }
}

impl fmt::Debug for ActiveWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveWallet")
            .field("wallet_id", &self.config.id)
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("personal_wallet_id", &self.personal_wallet_id)
            .finish()
    }
}

struct PendingConnect {
    attempt: u64,
    wallet_id: WalletId,
    wallet: Option<Arc<dyn Wallet>>,
    cancel: Arc<Notify>,
}

#[derive(Default)]
struct SessionState {
    status: ConnectionStatus,
    active: Option<ActiveWallet>,
    pending: Option<PendingConnect>,
    attempts: u64,
}

/// The single status / active-wallet slot.
///
/// At most one connect attempt is pending at a time; a second `connect` while
/// one is pending fails with [`ConnectError::InProgress`]. `active` is only
/// ever set together with [`ConnectionStatus::Connected`].
pub struct ConnectionSession {
    label: &'static str,
    state: RwLock<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    storage: Arc<dyn WalletStorage>,
    chains: Arc<ChainRegistry>,
    records: Option<ScopedStorage>,
}

impl ConnectionSession {
    /// The application session. Remembers the last connected wallet.
    pub fn new(storage: Arc<dyn WalletStorage>, chains: Arc<ChainRegistry>) -> Self {
        let records = ScopedStorage::new(storage.clone(), SESSION_SCOPE);
        Self::build("wallet", storage, chains, Some(records))
    }

    /// Session holding the personal wallet of a wrapper connection.
    pub fn personal(storage: Arc<dyn WalletStorage>, chains: Arc<ChainRegistry>) -> Self {
        Self::build("personal", storage, chains, None)
    }

    fn build(
        label: &'static str,
        storage: Arc<dyn WalletStorage>,
        chains: Arc<ChainRegistry>,
        records: Option<ScopedStorage>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            label,
            state: RwLock::new(SessionState::default()),
            events,
            storage,
            chains,
            records,
        }
    }

    pub fn storage(&self) -> Arc<dyn WalletStorage> {
        self.storage.clone()
    }

    pub fn chains(&self) -> Arc<ChainRegistry> {
        self.chains.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.state.read().await.status
    }

    pub async fn active_wallet(&self) -> Option<ActiveWallet> {
        self.state.read().await.active.clone()
    }

    pub async fn pending_wallet_id(&self) -> Option<WalletId> {
        let state = self.state.read().await;
        state.pending.as_ref().map(|pending| pending.wallet_id.clone())
    }

    /// Connects a personal wallet.
    pub async fn connect(
        &self,
        config: Arc<WalletConfig>,
        options: ConnectOptions,
    ) -> Result<ActiveWallet, ConnectError> {
        if config.is_wrapper() {
            return Err(ConnectError::PersonalWalletRequired(config.id.clone()));
        }
        self.run_connect(config, options, None).await
    }

    /// Connects a wrapper wallet on top of an already connected personal wallet.
    pub async fn connect_wrapper(
        &self,
        config: Arc<WalletConfig>,
        mut options: ConnectOptions,
        personal: &ActiveWallet,
    ) -> Result<ActiveWallet, ConnectError> {
        if !config.is_wrapper() {
            return Err(ConnectError::NotWrapper(config.id.clone()));
        }
        if config.personal_wallet(personal.wallet_id()).is_none() {
            return Err(ConnectError::UnknownWallet(personal.wallet_id().clone()));
        }
        if options.chain_id.is_none() {
            options.chain_id = Some(personal.chain_id);
        }
        self.run_connect(config, options, Some(personal)).await
    }

    async fn run_connect(
        &self,
        config: Arc<WalletConfig>,
        options: ConnectOptions,
        personal: Option<&ActiveWallet>,
    ) -> Result<ActiveWallet, ConnectError> {
        let chain_id = match options.chain_id {
            Some(chain_id) if !self.chains.contains(chain_id) => {
                return Err(ConnectError::UnsupportedChain(chain_id));
            }
            Some(chain_id) => chain_id,
            None => self.chains.default_chain(),
        };

        let (attempt, cancel, previous) = {
            let mut state = self.state.write().await;
            if state.pending.is_some() {
                return Err(ConnectError::InProgress);
            }

            let previous = state.active.take();
            if let Some(previous) = &previous {
                self.emit(SessionEvent::Disconnected {
                    wallet_id: previous.wallet_id().clone(),
                });
                self.emit(SessionEvent::StatusChanged(ConnectionStatus::Disconnected));
            }

            state.attempts += 1;
            let attempt = state.attempts;
            let cancel = Arc::new(Notify::new());
            state.pending = Some(PendingConnect {
                attempt,
                wallet_id: config.id.clone(),
                wallet: None,
                cancel: cancel.clone(),
            });
            state.status = ConnectionStatus::Connecting;
            self.emit(SessionEvent::StatusChanged(ConnectionStatus::Connecting));
            (attempt, cancel, previous)
        };

        info!("{} session connecting {} on chain {}", self.label, config.id, chain_id);
        if let Some(previous) = previous {
            info!("{} session replacing {}", self.label, previous.wallet_id());
            self.teardown(&previous.wallet).await;
        }

        let created = config.create(CreateOptions {
            chain_id,
            storage: ScopedStorage::new(self.storage.clone(), config.id.as_str()),
            personal_wallet: personal.map(|personal| personal.wallet.clone()),
        });
        let wallet = match created {
            Ok(wallet) => wallet,
            Err(err) => {
                self.finish_attempt(attempt).await;
                return Err(err.into());
            }
        };

        let registered = {
            let mut state = self.state.write().await;
            match state.pending.as_mut() {
                Some(pending) if pending.attempt == attempt => {
                    pending.wallet = Some(wallet.clone());
                    true
                }
                _ => false,
            }
        };
        if !registered {
            self.teardown(&wallet).await;
            return Err(ConnectError::Cancelled);
        }

        let outcome = tokio::select! {
            result = wallet.connect(&options) => Some(result),
            _ = cancel.notified() => None,
        };
        let Some(result) = outcome else {
            info!("{} session connect to {} cancelled", self.label, config.id);
            return Err(ConnectError::Cancelled);
        };

        let address = match result {
            Ok(address) => address,
            Err(err) => {
                info!("{} session failed to connect {}: {}", self.label, config.id, err);
                self.finish_attempt(attempt).await;
                self.teardown(&wallet).await;
                return Err(err.into());
            }
        };

        let active = ActiveWallet {
            config: config.clone(),
            wallet: wallet.clone(),
            address,
            chain_id: wallet.chain_id().await.unwrap_or(chain_id),
            personal_wallet_id: personal.map(|personal| personal.wallet_id().clone()),
        };

        let committed = {
            let mut state = self.state.write().await;
            if state.pending.as_ref().is_some_and(|pending| pending.attempt == attempt) {
                state.pending = None;
                state.status = ConnectionStatus::Connected;
                state.active = Some(active.clone());
                self.emit(SessionEvent::StatusChanged(ConnectionStatus::Connected));
                self.emit(SessionEvent::Connected {
                    wallet_id: active.wallet_id().clone(),
                    address: active.address.clone(),
                    chain_id: active.chain_id,
                });
                true
            } else {
                false
            }
        };
        if !committed {
            self.teardown(&wallet).await;
            return Err(ConnectError::Cancelled);
        }

        info!(
            "{} session connected {} as {} on chain {}",
            self.label,
            active.wallet_id(),
            active.address,
            active.chain_id
        );
        self.remember(&active).await;
        Ok(active)
    }

    /// Abandons the pending connect attempt, if any, and disconnects its
    /// instance.
    pub async fn cancel_pending(&self) -> bool {
        let pending = {
            let mut state = self.state.write().await;
            let Some(pending) = state.pending.take() else {
                return false;
            };
            state.status = ConnectionStatus::Disconnected;
            self.emit(SessionEvent::StatusChanged(ConnectionStatus::Disconnected));
            pending
        };

        pending.cancel.notify_one();
        info!("{} session cancelled connect to {}", self.label, pending.wallet_id);
        if let Some(wallet) = pending.wallet {
            self.teardown(&wallet).await;
        }
        true
    }

    /// Disconnecting an instance that is neither active nor pending is a no-op.
    pub async fn disconnect(&self, wallet: &Arc<dyn Wallet>) -> Result<(), ConnectError> {
        let is_pending = {
            let state = self.state.read().await;
            state
                .pending
                .as_ref()
                .and_then(|pending| pending.wallet.as_ref())
                .is_some_and(|pending| same_wallet(pending, wallet))
        };
        if is_pending {
            self.cancel_pending().await;
            return Ok(());
        }

        let active = {
            let mut state = self.state.write().await;
            let Some(active) = state
                .active
                .take_if(|active| same_wallet(&active.wallet, wallet))
            else {
                debug!(
                    "{} session ignoring disconnect of inactive {}",
                    self.label,
                    wallet.wallet_id()
                );
                return Ok(());
            };
            state.status = ConnectionStatus::Disconnected;
            self.emit(SessionEvent::Disconnected {
                wallet_id: active.wallet_id().clone(),
            });
            self.emit(SessionEvent::StatusChanged(ConnectionStatus::Disconnected));
            active
        };

        info!("{} session disconnected {}", self.label, active.wallet_id());
        self.forget().await;
        active.wallet.disconnect().await?;
        Ok(())
    }

    /// Removes `wallet` from the active slot without disconnecting it, so it
    /// can be [`adopt`](Self::adopt)ed by another session.
    pub async fn detach(&self, wallet: &Arc<dyn Wallet>) -> Option<ActiveWallet> {
        let mut state = self.state.write().await;
        let active = state.active.take_if(|active| same_wallet(&active.wallet, wallet))?;
        state.status = ConnectionStatus::Disconnected;
        self.emit(SessionEvent::Disconnected {
            wallet_id: active.wallet_id().clone(),
        });
        self.emit(SessionEvent::StatusChanged(ConnectionStatus::Disconnected));
        debug!("{} session detached {}", self.label, active.wallet_id());
        Some(active)
    }

    /// Installs an already connected wallet as the active one. Whatever was
    /// pending or active before is torn down.
    pub async fn adopt(&self, active: ActiveWallet) {
        let (pending, previous) = {
            let mut state = self.state.write().await;
            let pending = state.pending.take();
            let previous = state.active.replace(active.clone());
            if let Some(previous) = &previous {
                self.emit(SessionEvent::Disconnected {
                    wallet_id: previous.wallet_id().clone(),
                });
            }
            state.status = ConnectionStatus::Connected;
            self.emit(SessionEvent::StatusChanged(ConnectionStatus::Connected));
            self.emit(SessionEvent::Connected {
                wallet_id: active.wallet_id().clone(),
                address: active.address.clone(),
                chain_id: active.chain_id,
            });
            (pending, previous)
        };

        info!("{} session adopted {} as {}", self.label, active.wallet_id(), active.address);
        if let Some(pending) = pending {
            pending.cancel.notify_one();
            if let Some(wallet) = pending.wallet {
                self.teardown(&wallet).await;
            }
        }
        let replaced = previous.filter(|previous| !same_wallet(&previous.wallet, &active.wallet));
        if let Some(previous) = replaced {
            self.teardown(&previous.wallet).await;
        }
        self.remember(&active).await;
    }

    pub async fn disconnect_active(&self) -> Result<(), ConnectError> {
        match self.active_wallet().await {
            Some(active) => self.disconnect(&active.wallet).await,
            None => Ok(()),
        }
    }

    pub async fn switch_chain(&self, chain_id: ChainId) -> Result<(), ConnectError> {
        if !self.chains.contains(chain_id) {
            return Err(ConnectError::UnsupportedChain(chain_id));
        }
        let active = self.active_wallet().await.ok_or(ConnectError::NotConnected)?;
        active.wallet.switch_chain(chain_id).await?;

        let updated = {
            let mut state = self.state.write().await;
            match state.active.as_mut() {
                Some(current) if same_wallet(&current.wallet, &active.wallet) => {
                    current.chain_id = chain_id;
                    self.emit(SessionEvent::ChainChanged {
                        wallet_id: current.wallet_id().clone(),
                        chain_id,
                    });
                    Some(current.clone())
                }
                _ => None,
            }
        };

        if let Some(updated) = updated {
            info!("{} session switched {} to chain {}", self.label, updated.wallet_id(), chain_id);
            self.remember(&updated).await;
        }
        Ok(())
    }

    pub async fn last_connected(&self) -> Option<LastConnected> {
        let records = self.records.as_ref()?;
        match load_json(records, LAST_CONNECTED_KEY).await {
            Ok(record) => record,
            Err(err) => {
                warn!("failed to read last connected wallet: {err:#}");
                None
            }
        }
    }

    pub(crate) async fn forget(&self) {
        let Some(records) = &self.records else {
            return;
        };
        if let Err(err) = records.remove_item(LAST_CONNECTED_KEY).await {
            warn!("failed to clear last connected wallet: {err:#}");
        }
    }

    async fn remember(&self, active: &ActiveWallet) {
        let Some(records) = &self.records else {
            return;
        };
        let record = LastConnected {
            wallet_id: active.wallet_id().clone(),
            chain_id: active.chain_id,
            personal_wallet_id: active.personal_wallet_id.clone(),
        };
        if let Err(err) = save_json(records, LAST_CONNECTED_KEY, &record).await {
            warn!("failed to remember {}: {err:#}", record.wallet_id);
        }
    }

    async fn finish_attempt(&self, attempt: u64) {
        let mut state = self.state.write().await;
        if state.pending.as_ref().is_some_and(|pending| pending.attempt == attempt) {
            state.pending = None;
            state.status = ConnectionStatus::Disconnected;
            self.emit(SessionEvent::StatusChanged(ConnectionStatus::Disconnected));
        }
    }

    async fn teardown(&self, wallet: &Arc<dyn Wallet>) {
        if let Err(err) = wallet.disconnect().await {
            warn!("{} session failed to tear down {}: {}", self.label, wallet.wallet_id(), err);
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}
