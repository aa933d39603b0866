use ck_api_types::{ConnectionStatus, ModalConfig, SessionResponse, WalletId};
use ck_wallet_core::{ConnectOptions, WalletConfig, WalletRegistry};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    ActiveWallet, ConnectError, ConnectionSession, Screen, ScreenNavigator, SessionEvent,
    WrapperFlow, WrapperPhase,
};

pub const DEFAULT_CLOSE_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellVariant {
    /// Overlay dialog, opened and closed by the host.
    Modal,
    /// Always mounted inline; renders nothing once connected.
    Embed,
}

/// What the shell renders.
#[derive(Debug, Clone)]
pub enum View {
    Hidden,
    WalletList(Vec<Arc<WalletConfig>>),
    GetStarted,
    Connect(Arc<WalletConfig>),
    PersonalWalletList {
        wrapper: Arc<WalletConfig>,
        selected: Option<Arc<WalletConfig>>,
    },
    FinalizeWrapper {
        wrapper: Arc<WalletConfig>,
        personal: ActiveWallet,
    },
}

impl View {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hidden => "hidden",
            Self::WalletList(_) => "wallet_list",
            Self::GetStarted => "get_started",
            Self::Connect(_) => "connect",
            Self::PersonalWalletList { .. } => "personal_wallet_list",
            Self::FinalizeWrapper { .. } => "finalize_wrapper",
        }
    }
}

#[derive(Debug)]
pub enum ShellOutcome {
    Connected(ActiveWallet),
    /// Phase A finished; the wrapper still needs finalizing.
    PersonalReady(ActiveWallet),
    /// A wrapper was picked with no personal wallet connected yet.
    PersonalWalletRequired,
    Cancelled,
}

impl ShellOutcome {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::PersonalReady(_) => "personal_ready",
            Self::PersonalWalletRequired => "personal_wallet_required",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn wallet(&self) -> Option<&ActiveWallet> {
        match self {
            Self::Connected(active) | Self::PersonalReady(active) => Some(active),
            _ => None,
        }
    }
}

struct ShellState {
    open: bool,
    closing: bool,
    navigator: ScreenNavigator,
    flow: Option<WrapperFlow>,
    modal_config: ModalConfig,
    last_error: Option<String>,
}

/// Hosts the connect flow for one [`ConnectionSession`].
///
/// Wrapper wallets get a second, personal session owned by the shell. The
/// state lock is never held while a wallet call is pending so a close can
/// always cancel an in-flight connect.
pub struct ConnectShell {
    variant: ShellVariant,
    registry: Arc<WalletRegistry>,
    session: Arc<ConnectionSession>,
    personal: Arc<ConnectionSession>,
    close_delay: Duration,
    state: RwLock<ShellState>,
}

impl ConnectShell {
    pub fn new(
        variant: ShellVariant,
        registry: Arc<WalletRegistry>,
        session: Arc<ConnectionSession>,
    ) -> Self {
        let personal = Arc::new(ConnectionSession::personal(session.storage(), session.chains()));
        let mut state = ShellState {
            open: variant == ShellVariant::Embed,
            closing: false,
            navigator: ScreenNavigator::new(registry.list().to_vec()),
            flow: None,
            modal_config: ModalConfig::default(),
            last_error: None,
        };
        sync_flow(&mut state);

        Self {
            variant,
            registry,
            session,
            personal,
            close_delay: DEFAULT_CLOSE_DELAY,
            state: RwLock::new(state),
        }
    }

    pub fn modal(registry: Arc<WalletRegistry>, session: Arc<ConnectionSession>) -> Self {
        Self::new(ShellVariant::Modal, registry, session)
    }

    pub fn embed(registry: Arc<WalletRegistry>, session: Arc<ConnectionSession>) -> Self {
        Self::new(ShellVariant::Embed, registry, session)
    }

    pub fn with_close_delay(mut self, close_delay: Duration) -> Self {
        self.close_delay = close_delay;
        self
    }

    pub fn with_modal_config(mut self, config: ModalConfig) -> Self {
        self.state.get_mut().modal_config = config;
        self
    }

    pub fn variant(&self) -> ShellVariant {
        self.variant
    }

    pub fn registry(&self) -> &Arc<WalletRegistry> {
        &self.registry
    }

    pub fn session(&self) -> &Arc<ConnectionSession> {
        &self.session
    }

    pub fn personal_session(&self) -> &Arc<ConnectionSession> {
        &self.personal
    }

    pub async fn modal_config(&self) -> ModalConfig {
        self.state.read().await.modal_config.clone()
    }

    pub async fn set_modal_config(&self, config: ModalConfig) {
        self.state.write().await.modal_config = config;
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    pub async fn is_open(&self) -> bool {
        self.state.read().await.open
    }

    pub async fn is_closing(&self) -> bool {
        self.state.read().await.closing
    }

    pub async fn current_screen(&self) -> Screen {
        self.state.read().await.navigator.current().clone()
    }

    pub async fn open(&self) {
        let mut state = self.state.write().await;
        state.open = true;
        state.closing = false;
        debug!("shell opened on {}", state.navigator.current().name());
    }

    pub async fn view(&self) -> View {
        let (open, current, flow) = {
            let state = self.state.read().await;
            (state.open, state.navigator.current().clone(), state.flow.clone())
        };

        let hidden = match self.variant {
            ShellVariant::Modal => !open,
            ShellVariant::Embed => self.session.status().await == ConnectionStatus::Connected,
        };
        if hidden {
            return View::Hidden;
        }

        match current {
            Screen::Main => View::WalletList(self.registry.list().to_vec()),
            Screen::GetStarted => View::GetStarted,
            Screen::Wallet(config) => {
                let Some(flow) = flow.filter(|flow| flow.wrapper().id == config.id) else {
                    return View::Connect(config);
                };
                match flow.ready_personal(&self.personal).await {
                    Some(personal) => View::FinalizeWrapper {
                        wrapper: config,
                        personal,
                    },
                    None => View::PersonalWalletList {
                        wrapper: config,
                        selected: flow.navigator().current().wallet().cloned(),
                    },
                }
            }
        }
    }

    pub async fn select_wallet(&self, wallet_id: &WalletId) -> Result<View, ConnectError> {
        {
            let mut state = self.state.write().await;
            state.navigator.select_wallet(wallet_id)?;
            sync_flow(&mut state);
            state.last_error = None;
        }
        Ok(self.view().await)
    }

    /// Steps back inside a wrapper's personal wallet list first, then to the
    /// initial screen.
    pub async fn go_back(&self) -> View {
        {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            let nested = state
                .flow
                .as_mut()
                .filter(|flow| flow.navigator().current() != flow.navigator().initial());
            match nested {
                Some(flow) => {
                    flow.navigator_mut().go_back();
                }
                None => {
                    state.navigator.go_back();
                    sync_flow(state);
                }
            }
            state.last_error = None;
        }
        self.view().await
    }

    pub async fn show_get_started(&self) -> bool {
        self.state.write().await.navigator.show_get_started()
    }

    /// Connects a top-level wallet. Picking a wrapper runs Phase B directly
    /// when one of its personal wallets is already connected.
    pub async fn connect(
        &self,
        wallet_id: &WalletId,
        options: ConnectOptions,
    ) -> Result<ShellOutcome, ConnectError> {
        let config = self
            .registry
            .get(wallet_id)
            .ok_or_else(|| ConnectError::UnknownWallet(wallet_id.clone()))?;
        let flow = {
            let mut state = self.state.write().await;
            state.navigator.select_wallet(wallet_id)?;
            sync_flow(&mut state);
            state.last_error = None;
            state.flow.clone()
        };

        if let Some(flow) = flow {
            if flow.phase(&self.session, &self.personal).await == WrapperPhase::SelectPersonal
                && !self.hand_over_personal(&flow).await
            {
                info!("{} needs a personal wallet first", wallet_id);
                return Ok(ShellOutcome::PersonalWalletRequired);
            }
            return self.finalize_wrapper(wallet_id, options).await;
        }

        match self.session.connect(config, options).await {
            Ok(active) => {
                self.on_connected().await;
                Ok(ShellOutcome::Connected(active))
            }
            Err(err) if err.is_cancelled() => Ok(ShellOutcome::Cancelled),
            Err(err @ ConnectError::InProgress) => Err(err),
            Err(err) => {
                let mut state = self.state.write().await;
                state.last_error = Some(err.to_string());
                state.navigator.go_back();
                sync_flow(&mut state);
                Err(err)
            }
        }
    }

    /// Phase A of a wrapper connection.
    pub async fn connect_personal(
        &self,
        wrapper_id: &WalletId,
        personal_wallet_id: &WalletId,
        options: ConnectOptions,
    ) -> Result<ShellOutcome, ConnectError> {
        if let Some(live) = self.live_wrapper().await {
            return Err(ConnectError::WrapperActive(live.wallet_id().clone()));
        }
        let flow = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            state.navigator.select_wallet(wrapper_id)?;
            sync_flow(state);
            state.last_error = None;
            let flow = state
                .flow
                .as_mut()
                .ok_or_else(|| ConnectError::NotWrapper(wrapper_id.clone()))?;
            flow.navigator_mut()
                .select_wallet(personal_wallet_id)
                .map_err(|err| err.in_phase(crate::ConnectPhase::Personal))?;
            flow.clone()
        };

        match flow.connect_personal(&self.personal, personal_wallet_id, options).await {
            Ok(active) => Ok(ShellOutcome::PersonalReady(active)),
            Err(err) if err.is_cancelled() => Ok(ShellOutcome::Cancelled),
            Err(err @ ConnectError::InProgress) => Err(err),
            Err(err) => {
                let mut guard = self.state.write().await;
                let state = &mut *guard;
                state.last_error = Some(err.to_string());
                if let Some(flow) = state.flow.as_mut() {
                    flow.navigator_mut().go_back();
                }
                Err(err)
            }
        }
    }

    /// Phase B of a wrapper connection. On failure the shell stays on the
    /// finalize view so it can be retried without redoing Phase A.
    pub async fn finalize_wrapper(
        &self,
        wrapper_id: &WalletId,
        options: ConnectOptions,
    ) -> Result<ShellOutcome, ConnectError> {
        let flow = {
            let mut state = self.state.write().await;
            state.navigator.select_wallet(wrapper_id)?;
            sync_flow(&mut state);
            state.last_error = None;
            state
                .flow
                .clone()
                .ok_or_else(|| ConnectError::NotWrapper(wrapper_id.clone()))?
        };

        if flow.phase(&self.session, &self.personal).await == WrapperPhase::Connected {
            if let Some(active) = self.session.active_wallet().await {
                self.on_connected().await;
                return Ok(ShellOutcome::Connected(active));
            }
        }

        match flow.finalize(&self.session, &self.personal, options).await {
            Ok(active) => {
                self.on_connected().await;
                Ok(ShellOutcome::Connected(active))
            }
            Err(err) if err.is_cancelled() => Ok(ShellOutcome::Cancelled),
            Err(err @ ConnectError::InProgress) => Err(err),
            Err(err) => {
                warn!("finalizing {} failed: {}", wrapper_id, err);
                self.state.write().await.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Disconnects the active wallet and any personal wallet behind it.
    pub async fn disconnect(&self) -> Result<(), ConnectError> {
        self.session.disconnect_active().await?;
        self.personal.disconnect_active().await?;
        let mut state = self.state.write().await;
        state.navigator.reset();
        sync_flow(&mut state);
        Ok(())
    }

    /// Cancels in-flight connects and marks the modal as closing. Returns
    /// `false` when there is nothing visible to close.
    pub async fn begin_close(&self) -> bool {
        let outer = self.session.cancel_pending().await;
        let personal = self.personal.cancel_pending().await;
        if outer || personal {
            info!("closing shell cancelled an in-flight connect");
        }

        let mut state = self.state.write().await;
        if self.variant != ShellVariant::Modal || !state.open {
            return false;
        }
        state.closing = true;
        true
    }

    pub async fn commit_close(&self, reset: bool) {
        let mut state = self.state.write().await;
        if self.variant == ShellVariant::Modal {
            state.open = false;
        }
        state.closing = false;
        if reset {
            state.navigator.reset();
            sync_flow(&mut state);
            state.last_error = None;
        }
        debug!("shell closed (reset: {})", reset);
    }

    pub async fn close(&self, reset: bool) {
        if self.begin_close().await {
            tokio::time::sleep(self.close_delay).await;
        }
        self.commit_close(reset).await;
    }

    /// Reopens a closed modal when a wrapper connection is waiting on Phase B.
    pub async fn sync_with_session(&self) -> bool {
        if self.variant != ShellVariant::Modal {
            return false;
        }
        if self.session.status().await != ConnectionStatus::Disconnected {
            return false;
        }

        let flow = self.state.read().await.flow.clone();
        let Some(flow) = flow else {
            return false;
        };
        if flow.ready_personal(&self.personal).await.is_none() {
            return false;
        }

        let mut state = self.state.write().await;
        if state.open {
            return false;
        }
        info!("reopening shell to finalize {}", flow.wrapper().id);
        state.open = true;
        true
    }

    /// Restores the last connected wallet, personal wallet first for wrappers.
    pub async fn auto_connect(&self) -> Result<Option<ActiveWallet>, ConnectError> {
        let Some(record) = self.session.last_connected().await else {
            return Ok(None);
        };
        let Some(config) = self.registry.get(&record.wallet_id) else {
            warn!("forgetting unknown last connected wallet {}", record.wallet_id);
            self.session.forget().await;
            return Err(ConnectError::UnknownWallet(record.wallet_id));
        };

        info!("restoring {} on chain {}", record.wallet_id, record.chain_id);
        let options = ConnectOptions::with_chain(record.chain_id);
        let active = if config.is_wrapper() {
            let personal_wallet_id = record
                .personal_wallet_id
                .clone()
                .ok_or_else(|| ConnectError::PersonalWalletRequired(config.id.clone()))?;
            let flow = {
                let mut state = self.state.write().await;
                state.navigator.select_wallet(&config.id)?;
                sync_flow(&mut state);
                state
                    .flow
                    .clone()
                    .ok_or_else(|| ConnectError::NotWrapper(config.id.clone()))?
            };

            if flow.ready_personal(&self.personal).await.is_none() {
                flow.connect_personal(&self.personal, &personal_wallet_id, options.clone())
                    .await?;
            }
            match flow.finalize(&self.session, &self.personal, options).await {
                Ok(active) => active,
                Err(err) => {
                    self.state.write().await.last_error = Some(err.to_string());
                    self.sync_with_session().await;
                    return Err(err);
                }
            }
        } else {
            self.session.connect(config, options).await?
        };

        self.on_connected().await;
        Ok(Some(active))
    }

    pub async fn describe(&self) -> SessionResponse {
        let view = self.view().await;
        let status = self.session.status().await;
        let active_wallet = self.session.active_wallet().await.map(|active| active.info());
        let personal_wallet = self.personal.active_wallet().await.map(|active| active.info());
        let state = self.state.read().await;
        SessionResponse {
            status,
            active_wallet,
            personal_wallet,
            modal_open: state.open,
            view: view.name().to_owned(),
            last_error: state.last_error.clone(),
        }
    }

    /// Follows both sessions: closes the modal when the outer session
    /// connects and reopens it when a wrapper is waiting on Phase B.
    pub fn spawn_watcher(self: &Arc<Self>) -> JoinHandle<()> {
        let shell: Weak<Self> = Arc::downgrade(self);
        let mut outer = self.session.subscribe();
        let mut personal = self.personal.subscribe();

        tokio::spawn(async move {
            loop {
                let (event, from_personal) = tokio::select! {
                    event = outer.recv() => (event, false),
                    event = personal.recv() => (event, true),
                };
                let event = match event {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("shell watcher skipped {} session events", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(shell) = shell.upgrade() else {
                    break;
                };

                match (from_personal, event) {
                    (false, SessionEvent::Connected { .. }) => shell.on_connected().await,
                    (true, SessionEvent::Connected { .. }) => {
                        shell.sync_with_session().await;
                    }
                    _ => {}
                }
            }
            debug!("shell watcher stopped");
        })
    }

    /// The outer wallet when it is a wrapper running on the personal session.
    async fn live_wrapper(&self) -> Option<ActiveWallet> {
        self.session
            .active_wallet()
            .await
            .filter(|active| active.personal_wallet_id.is_some())
    }

    /// Moves an outer wallet that is one of `flow`'s personal wallets into the
    /// personal session so Phase B can use it without a second connection.
    async fn hand_over_personal(&self, flow: &WrapperFlow) -> bool {
        let Some(active) = self.session.active_wallet().await else {
            return false;
        };
        if flow.wrapper().personal_wallet(active.wallet_id()).is_none() {
            return false;
        }
        let Some(active) = self.session.detach(&active.wallet).await else {
            return false;
        };
        info!("{} authorizes {} as its personal wallet", active.wallet_id(), flow.wrapper().id);
        self.personal.adopt(active).await;
        true
    }

    async fn on_connected(&self) {
        let mut state = self.state.write().await;
        state.navigator.reset();
        sync_flow(&mut state);
        state.last_error = None;
        if self.variant == ShellVariant::Modal && state.open {
            state.open = false;
            state.closing = false;
            info!("wallet connected, closing modal");
        }
    }
}

/// Keeps `flow` in step with the navigator: present iff a wrapper screen is showing.
fn sync_flow(state: &mut ShellState) {
    let wrapper = state
        .navigator
        .current()
        .wallet()
        .filter(|config| config.is_wrapper())
        .cloned();
    match wrapper {
        Some(config) => {
            if state.flow.as_ref().is_some_and(|flow| flow.wrapper().id == config.id) {
                return;
            }
            state.flow = WrapperFlow::new(config).ok();
        }
        None => state.flow = None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ck_api_types::{ChainId, WalletAddress};
    use ck_chain_client::ChainRegistry;
    use ck_storage::InMemoryStorage;
    use ck_wallet_core::mock::{MockBehavior, MockFactory};
    use ck_wallet_core::{Wallet, WrapperFlavor};

    fn shell_for(
        variant: ShellVariant,
        storage: Arc<InMemoryStorage>,
        configs: Vec<WalletConfig>,
    ) -> anyhow::Result<Arc<ConnectShell>> {
        let registry = Arc::new(WalletRegistry::new(configs)?);
        let chains = Arc::new(ChainRegistry::with_defaults());
        let session = Arc::new(ConnectionSession::new(storage, chains));
        let shell = ConnectShell::new(variant, registry, session);
        Ok(Arc::new(shell.with_close_delay(Duration::from_millis(5))))
    }

    fn modal(configs: Vec<WalletConfig>) -> anyhow::Result<Arc<ConnectShell>> {
        shell_for(ShellVariant::Modal, Arc::new(InMemoryStorage::new()), configs)
    }

    fn id(value: &str) -> WalletId {
        WalletId::new(value)
    }

    fn statuses(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<ConnectionStatus> {
        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SessionEvent::StatusChanged(status) = event {
                seen.push(status);
            }
        }
        seen
    }

    #[tokio::test]
    async fn selecting_and_connecting_closes_the_modal() -> anyhow::Result<()> {
        let wallet_a = MockFactory::resolving("wallet-a", "0xABC");
        let wallet_b = MockFactory::resolving("wallet-b", "0xBBB");
        let shell = modal(vec![wallet_a.config(), wallet_b.config()])?;
        let mut rx = shell.session().subscribe();

        shell.open().await;
        assert!(matches!(shell.view().await, View::WalletList(ref wallets) if wallets.len() == 2));
        assert!(matches!(shell.select_wallet(&id("wallet-a")).await?, View::Connect(_)));

        let outcome = shell.connect(&id("wallet-a"), ConnectOptions::default()).await?;
        assert_eq!(outcome.wallet().map(|active| active.address.as_str()), Some("0xABC"));
        assert_eq!(
            statuses(&mut rx),
            vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
        );

        let active = shell.session().active_wallet().await.expect("active wallet");
        assert_eq!(active.address, WalletAddress::new("0xABC"));
        assert!(!shell.is_open().await);
        assert!(wallet_b.created().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn live_wrapper_blocks_another_personal_connect() -> anyhow::Result<()> {
        let wallet_a = MockFactory::resolving("wallet-a", "0xDEF");
        let smart = MockFactory::wrapper("smart", "0x123");
        let shell = modal(vec![
            smart.wrapper_config(WrapperFlavor::SmartAccount, vec![wallet_a.config()]),
        ])?;

        shell
            .connect_personal(&id("smart"), &id("wallet-a"), ConnectOptions::default())
            .await?;
        shell.finalize_wrapper(&id("smart"), ConnectOptions::default()).await?;

        let err = shell
            .connect_personal(&id("smart"), &id("wallet-a"), ConnectOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::WrapperActive(ref wrapper) if wrapper == &id("smart")));
        assert_eq!(wallet_a.created().len(), 1);

        let outer = shell.session().active_wallet().await.expect("wrapper connected");
        let personal = outer.wallet.personal_wallet().expect("personal wallet");
        assert_eq!(personal.address().await, Some(WalletAddress::new("0xDEF")));
        assert_eq!(wallet_a.last_created().expect("instance").disconnect_calls(), 0);

        let again = shell.connect(&id("smart"), ConnectOptions::default()).await?;
        let again = again.wallet().expect("wrapper still connected");
        assert_eq!(again.wallet_id(), &id("smart"));
        assert_eq!(smart.created().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn active_personal_wallet_authorizes_wrapper_directly() -> anyhow::Result<()> {
        let wallet_a = MockFactory::resolving("wallet-a", "0xDEF");
        let smart = MockFactory::wrapper("smart", "0x123");
        let shell = modal(vec![
            wallet_a.config(),
            smart.wrapper_config(WrapperFlavor::SmartAccount, vec![wallet_a.config()]),
        ])?;

        shell.connect(&id("wallet-a"), ConnectOptions::default()).await?;
        shell.open().await;

        let outcome = shell.connect(&id("smart"), ConnectOptions::default()).await?;
        let active = outcome.wallet().expect("wrapper connected");
        assert_eq!(active.wallet_id(), &id("smart"));
        assert_eq!(active.personal_wallet_id, Some(id("wallet-a")));

        assert_eq!(wallet_a.created().len(), 1);
        let instance = wallet_a.last_created().expect("instance");
        assert_eq!(instance.connect_calls(), 1);
        assert_eq!(instance.disconnect_calls(), 0);

        let personal = shell.personal_session().active_wallet().await.expect("personal wallet");
        assert_eq!(personal.wallet_id(), &id("wallet-a"));
        assert!(!shell.is_open().await);
        Ok(())
    }

    #[tokio::test]
    async fn wrapper_connects_after_personal_wallet() -> anyhow::Result<()> {
        let wallet_a = MockFactory::resolving("wallet-a", "0xDEF");
        let safe = MockFactory::wrapper("safe", "0x123");
        let shell = modal(vec![safe.wrapper_config(WrapperFlavor::Safe, vec![wallet_a.config()])])?;
        let mut outer_events = shell.session().subscribe();

        shell.open().await;
        match shell.view().await {
            View::PersonalWalletList { wrapper, selected } => {
                assert_eq!(wrapper.id, id("safe"));
                assert_eq!(selected.map(|config| config.id.clone()), Some(id("wallet-a")));
            }
            other => panic!("unexpected view {other:?}"),
        }

        let outcome = shell.connect(&id("safe"), ConnectOptions::default()).await?;
        assert!(matches!(outcome, ShellOutcome::PersonalWalletRequired));

        let ready = shell
            .connect_personal(&id("safe"), &id("wallet-a"), ConnectOptions::default())
            .await?;
        assert!(matches!(
            ready,
            ShellOutcome::PersonalReady(ref active) if active.address.as_str() == "0xDEF"
        ));
        assert_eq!(shell.session().status().await, ConnectionStatus::Disconnected);
        assert!(matches!(shell.view().await, View::FinalizeWrapper { .. }));

        let outcome = shell.finalize_wrapper(&id("safe"), ConnectOptions::default()).await?;
        let active = outcome.wallet().expect("wrapper connected");
        assert_eq!(active.address.as_str(), "0x123");
        assert_eq!(active.wallet_id(), &id("safe"));
        assert!(!shell.is_open().await);

        let personal_instance = wallet_a.last_created().expect("personal instance");
        assert_eq!(personal_instance.current_address(), Some(WalletAddress::new("0xDEF")));

        while let Ok(event) = outer_events.try_recv() {
            if let SessionEvent::Connected { wallet_id, .. } = event {
                assert_eq!(wallet_id, id("safe"));
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn rejected_connect_returns_to_wallet_list() -> anyhow::Result<()> {
        let wallet_a = MockFactory::rejecting("wallet-a", "User rejected");
        let wallet_b = MockFactory::resolving("wallet-b", "0xBBB");
        let shell = modal(vec![wallet_a.config(), wallet_b.config()])?;
        shell.open().await;

        let err = shell
            .connect(&id("wallet-a"), ConnectOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "User rejected");
        assert_eq!(shell.session().status().await, ConnectionStatus::Disconnected);
        assert_eq!(shell.current_screen().await, Screen::Main);
        assert_eq!(shell.last_error().await.as_deref(), Some("User rejected"));
        assert!(shell.is_open().await);
        Ok(())
    }

    #[tokio::test]
    async fn closing_during_connect_disconnects_the_attempt() -> anyhow::Result<()> {
        let hanging = MockFactory::hanging("wallet-a");
        let wallet_b = MockFactory::resolving("wallet-b", "0xBBB");
        let shell = modal(vec![hanging.config(), wallet_b.config()])?;
        let mut rx = shell.session().subscribe();
        shell.open().await;

        let task = {
            let shell = shell.clone();
            tokio::spawn(async move {
                shell.connect(&id("wallet-a"), ConnectOptions::default()).await
            })
        };
        while rx.recv().await? != SessionEvent::StatusChanged(ConnectionStatus::Connecting) {}

        shell.close(true).await;

        assert!(matches!(task.await??, ShellOutcome::Cancelled));
        assert_eq!(hanging.last_created().expect("instance").disconnect_calls(), 1);
        assert_eq!(shell.session().status().await, ConnectionStatus::Disconnected);
        assert!(!shell.is_open().await);
        assert!(matches!(shell.view().await, View::Hidden));
        Ok(())
    }

    #[tokio::test]
    async fn reopening_resumes_at_finalize() -> anyhow::Result<()> {
        let wallet_a = MockFactory::resolving("wallet-a", "0xDEF");
        let safe = MockFactory::wrapper("safe", "0x123");
        let shell = modal(vec![
            MockFactory::resolving("wallet-b", "0xBBB").config(),
            safe.wrapper_config(WrapperFlavor::SmartAccount, vec![wallet_a.config()]),
        ])?;

        shell.open().await;
        shell
            .connect_personal(&id("safe"), &id("wallet-a"), ConnectOptions::default())
            .await?;
        shell.close(true).await;

        shell.open().await;
        assert!(matches!(shell.view().await, View::WalletList(_)));
        match shell.select_wallet(&id("safe")).await? {
            View::FinalizeWrapper { personal, .. } => {
                assert_eq!(personal.address.as_str(), "0xDEF")
            }
            other => panic!("unexpected view {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn failed_finalize_keeps_personal_wallet_and_reopens() -> anyhow::Result<()> {
        let wallet_a = MockFactory::resolving("wallet-a", "0xDEF");
        let safe = MockFactory::wrapper("safe", "0x123");
        safe.set_behavior(MockBehavior::Reject("deployment failed".to_owned()));
        let shell = modal(vec![
            safe.wrapper_config(WrapperFlavor::SmartAccount, vec![wallet_a.config()]),
        ])?;

        shell.open().await;
        shell
            .connect_personal(&id("safe"), &id("wallet-a"), ConnectOptions::default())
            .await?;
        let err = shell
            .finalize_wrapper(&id("safe"), ConnectOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.phase(), Some(crate::ConnectPhase::Finalize));
        assert!(matches!(shell.view().await, View::FinalizeWrapper { .. }));
        assert_eq!(shell.personal_session().status().await, ConnectionStatus::Connected);

        shell.commit_close(false).await;
        assert!(shell.sync_with_session().await);
        assert!(shell.is_open().await);
        assert!(matches!(shell.view().await, View::FinalizeWrapper { .. }));

        safe.set_behavior(MockBehavior::Resolve(WalletAddress::new("0x123")));
        let outcome = shell.finalize_wrapper(&id("safe"), ConnectOptions::default()).await?;
        assert!(matches!(outcome, ShellOutcome::Connected(_)));
        assert_eq!(wallet_a.created().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn embed_hides_once_connected() -> anyhow::Result<()> {
        let shell = shell_for(
            ShellVariant::Embed,
            Arc::new(InMemoryStorage::new()),
            vec![MockFactory::resolving("wallet-a", "0xABC").config()],
        )?;

        assert!(matches!(shell.view().await, View::Connect(_)));
        shell.connect(&id("wallet-a"), ConnectOptions::default()).await?;
        assert!(matches!(shell.view().await, View::Hidden));
        assert!(!shell.begin_close().await);

        shell.disconnect().await?;
        assert!(matches!(shell.view().await, View::Connect(_)));
        Ok(())
    }

    #[tokio::test]
    async fn close_runs_in_two_steps() -> anyhow::Result<()> {
        let shell = modal(vec![
            MockFactory::resolving("wallet-a", "0xABC").config(),
            MockFactory::resolving("wallet-b", "0xBBB").config(),
        ])?;
        assert!(!shell.begin_close().await);

        shell.open().await;
        shell.select_wallet(&id("wallet-b")).await?;
        assert!(shell.begin_close().await);
        assert!(shell.is_closing().await);
        assert!(shell.is_open().await);

        shell.commit_close(false).await;
        assert!(!shell.is_open().await);
        assert_eq!(shell.current_screen().await.name(), "wallet");

        shell.open().await;
        shell.close(true).await;
        assert_eq!(shell.current_screen().await, Screen::Main);
        Ok(())
    }

    #[tokio::test]
    async fn navigation_goes_back_through_personal_list() -> anyhow::Result<()> {
        let safe = MockFactory::wrapper("safe", "0x123");
        let shell = modal(vec![
            MockFactory::resolving("wallet-b", "0xBBB").config(),
            safe.wrapper_config(
                WrapperFlavor::Safe,
                vec![
                    MockFactory::rejecting("wallet-a", "User rejected").config(),
                    MockFactory::resolving("wallet-c", "0xCCC").config(),
                ],
            ),
        ])?;
        shell.open().await;
        assert!(shell.show_get_started().await);
        assert!(matches!(shell.view().await, View::GetStarted));
        assert!(matches!(shell.go_back().await, View::WalletList(_)));

        let err = shell
            .connect_personal(&id("safe"), &id("wallet-a"), ConnectOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.phase(), Some(crate::ConnectPhase::Personal));
        assert!(matches!(
            shell.view().await,
            View::PersonalWalletList { selected: None, .. }
        ));
        assert!(matches!(shell.go_back().await, View::WalletList(_)));
        Ok(())
    }

    #[tokio::test]
    async fn auto_connect_restores_last_wallet() -> anyhow::Result<()> {
        let storage = Arc::new(InMemoryStorage::new());
        let wallet_a = MockFactory::resolving("wallet-a", "0xABC");
        let first = shell_for(ShellVariant::Modal, storage.clone(), vec![wallet_a.config()])?;
        first
            .connect(&id("wallet-a"), ConnectOptions::with_chain(ChainId(137)))
            .await?;

        let second = shell_for(ShellVariant::Modal, storage, vec![wallet_a.config()])?;
        let restored = second.auto_connect().await?.expect("restored");
        assert_eq!(restored.address.as_str(), "0xABC");
        assert_eq!(restored.chain_id, ChainId(137));
        Ok(())
    }

    #[tokio::test]
    async fn auto_connect_restores_wrapper_through_personal_wallet() -> anyhow::Result<()> {
        let storage = Arc::new(InMemoryStorage::new());
        let wallet_a = MockFactory::resolving("wallet-a", "0xDEF");
        let smart = MockFactory::wrapper("smart", "0x123");
        let configs = || {
            vec![smart.wrapper_config(WrapperFlavor::SmartAccount, vec![wallet_a.config()])]
        };

        let first = shell_for(ShellVariant::Modal, storage.clone(), configs())?;
        first
            .connect_personal(&id("smart"), &id("wallet-a"), ConnectOptions::default())
            .await?;
        first.finalize_wrapper(&id("smart"), ConnectOptions::default()).await?;

        let second = shell_for(ShellVariant::Modal, storage, configs())?;
        let restored = second.auto_connect().await?.expect("restored");
        assert_eq!(restored.address.as_str(), "0x123");
        assert_eq!(restored.personal_wallet_id, Some(id("wallet-a")));
        assert_eq!(second.personal_session().status().await, ConnectionStatus::Connected);
        Ok(())
    }

    #[tokio::test]
    async fn auto_connect_without_record_does_nothing() -> anyhow::Result<()> {
        let shell = modal(vec![MockFactory::resolving("wallet-a", "0xABC").config()])?;
        assert!(shell.auto_connect().await?.is_none());
        assert_eq!(shell.session().status().await, ConnectionStatus::Disconnected);
        Ok(())
    }

    #[tokio::test]
    async fn watcher_closes_modal_on_external_connect() -> anyhow::Result<()> {
        let wallet_a = MockFactory::resolving("wallet-a", "0xABC");
        let wallet_b = MockFactory::resolving("wallet-b", "0xBBB");
        let shell = modal(vec![wallet_a.config(), wallet_b.config()])?;
        let watcher = shell.spawn_watcher();
        shell.open().await;

        let config = shell.registry().get(&id("wallet-a")).expect("config");
        shell.session().connect(config, ConnectOptions::default()).await?;

        tokio::time::timeout(Duration::from_secs(1), async {
            while shell.is_open().await {
                tokio::task::yield_now().await;
            }
        })
        .await?;
        watcher.abort();
        Ok(())
    }

    #[tokio::test]
    async fn modal_config_is_replaceable() -> anyhow::Result<()> {
        let shell = modal(vec![MockFactory::resolving("wallet-a", "0xABC").config()])?;
        assert_eq!(shell.modal_config().await.title, "Connect");

        let mut config = ModalConfig::default();
        config.title = "Sign in".to_owned();
        config.size = ck_api_types::ModalSize::Compact;
        shell.set_modal_config(config.clone()).await;
        assert_eq!(shell.modal_config().await, config);
        Ok(())
    }
}
