use ck_api_types::WalletId;
use ck_wallet_core::{ConnectOptions, WalletConfig};
use std::sync::Arc;
use tracing::info;

use crate::{ActiveWallet, ConnectError, ConnectPhase, ConnectionSession, ScreenNavigator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperPhase {
    /// Phase A: pick and connect a personal wallet.
    SelectPersonal,
    /// Phase B: a personal wallet is ready, the wrapper is not connected yet.
    Finalize,
    Connected,
}

/// Two-phase connection of a wrapper wallet.
///
/// The personal wallet lives in its own [`ConnectionSession`], so a Phase B
/// failure leaves it connected while the outer session stays disconnected.
#[derive(Debug, Clone)]
pub struct WrapperFlow {
    wrapper: Arc<WalletConfig>,
    navigator: ScreenNavigator,
}

impl WrapperFlow {
    pub fn new(wrapper: Arc<WalletConfig>) -> Result<Self, ConnectError> {
        if !wrapper.is_wrapper() {
            return Err(ConnectError::NotWrapper(wrapper.id.clone()));
        }
        let navigator = ScreenNavigator::new(wrapper.personal_wallets().to_vec());
        Ok(Self { wrapper, navigator })
    }

    pub fn wrapper(&self) -> &Arc<WalletConfig> {
        &self.wrapper
    }

    /// Navigator over the wrapper's personal wallets.
    pub fn navigator(&self) -> &ScreenNavigator {
        &self.navigator
    }

    pub fn navigator_mut(&mut self) -> &mut ScreenNavigator {
        &mut self.navigator
    }

    /// The personal wallet connected in `personal`, if it belongs to this wrapper.
    pub async fn ready_personal(&self, personal: &ConnectionSession) -> Option<ActiveWallet> {
        personal
            .active_wallet()
            .await
            .filter(|active| self.wrapper.personal_wallet(active.wallet_id()).is_some())
    }

    pub async fn phase(
        &self,
        outer: &ConnectionSession,
        personal: &ConnectionSession,
    ) -> WrapperPhase {
        let outer_connected = outer
            .active_wallet()
            .await
            .is_some_and(|active| active.wallet_id() == &self.wrapper.id);
        if outer_connected {
            WrapperPhase::Connected
        } else if self.ready_personal(personal).await.is_some() {
            WrapperPhase::Finalize
        } else {
            WrapperPhase::SelectPersonal
        }
    }

    pub async fn connect_personal(
        &self,
        personal: &ConnectionSession,
        personal_wallet_id: &WalletId,
        options: ConnectOptions,
    ) -> Result<ActiveWallet, ConnectError> {
        let config = self
            .wrapper
            .personal_wallet(personal_wallet_id)
            .ok_or_else(|| ConnectError::UnknownWallet(personal_wallet_id.clone()))
            .map_err(|err| err.in_phase(ConnectPhase::Personal))?;

        let active = personal
            .connect(config, options)
            .await
            .map_err(|err| err.in_phase(ConnectPhase::Personal))?;
        info!("{} personal wallet ready: {}", self.wrapper.id, active.address);
        Ok(active)
    }

    pub async fn finalize(
        &self,
        outer: &ConnectionSession,
        personal: &ConnectionSession,
        options: ConnectOptions,
    ) -> Result<ActiveWallet, ConnectError> {
        let ready = self
            .ready_personal(personal)
            .await
            .ok_or_else(|| ConnectError::PersonalWalletRequired(self.wrapper.id.clone()))
            .map_err(|err| err.in_phase(ConnectPhase::Finalize))?;

        outer
            .connect_wrapper(self.wrapper.clone(), options, &ready)
            .await
            .map_err(|err| err.in_phase(ConnectPhase::Finalize))
    }
}
