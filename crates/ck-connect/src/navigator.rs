use ck_api_types::WalletId;
use ck_wallet_core::WalletConfig;
use std::sync::Arc;
use tracing::debug;

use crate::ConnectError;

#[derive(Debug, Clone)]
pub enum Screen {
    Main,
    GetStarted,
    Wallet(Arc<WalletConfig>),
}

impl Screen {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::GetStarted => "get_started",
            Self::Wallet(_) => "wallet",
        }
    }

    pub fn wallet(&self) -> Option<&Arc<WalletConfig>> {
        match self {
            Self::Wallet(config) => Some(config),
            _ => None,
        }
    }
}

impl PartialEq for Screen {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Main, Self::Main) | (Self::GetStarted, Self::GetStarted) => true,
            (Self::Wallet(a), Self::Wallet(b)) => a.id == b.id,
            _ => false,
        }
    }
}

impl Eq for Screen {}

/// Which screen of the connect flow is showing.
///
/// The initial screen is recomputed only when the set of wallet ids changes;
/// a recomputation always resets the current screen so it never points at a
/// wallet that is no longer listed.
#[derive(Debug, Clone)]
pub struct ScreenNavigator {
    wallets: Vec<Arc<WalletConfig>>,
    initial: Screen,
    current: Screen,
}

impl ScreenNavigator {
    pub fn new(wallets: Vec<Arc<WalletConfig>>) -> Self {
        let initial = Self::initial_screen(&wallets);
        Self {
            wallets,
            current: initial.clone(),
            initial,
        }
    }

    /// A lone wallet without its own selection UI is shown directly.
    pub fn initial_screen(wallets: &[Arc<WalletConfig>]) -> Screen {
        match wallets {
            [only] if !only.select_ui => Screen::Wallet(only.clone()),
            _ => Screen::Main,
        }
    }

    pub fn wallets(&self) -> &[Arc<WalletConfig>] {
        &self.wallets
    }

    pub fn current(&self) -> &Screen {
        &self.current
    }

    pub fn initial(&self) -> &Screen {
        &self.initial
    }

    pub fn select_wallet(&mut self, id: &WalletId) -> Result<&Screen, ConnectError> {
        let config = self
            .wallets
            .iter()
            .find(|config| &config.id == id)
            .cloned()
            .ok_or_else(|| ConnectError::UnknownWallet(id.clone()))?;
        debug!("navigator: {} -> wallet {}", self.current.name(), config.id);
        self.current = Screen::Wallet(config);
        Ok(&self.current)
    }

    pub fn go_back(&mut self) -> &Screen {
        debug!("navigator: {} -> back", self.current.name());
        self.current = self.initial.clone();
        &self.current
    }

    /// Only reachable from the wallet list.
    pub fn show_get_started(&mut self) -> bool {
        if self.current != Screen::Main {
            return false;
        }
        debug!("navigator: main -> get_started");
        self.current = Screen::GetStarted;
        true
    }

    pub fn reset(&mut self) {
        self.current = self.initial.clone();
    }

    /// Returns whether the wallet set changed (and the navigator was reset).
    pub fn set_wallets(&mut self, wallets: Vec<Arc<WalletConfig>>) -> bool {
        let unchanged = wallets.len() == self.wallets.len()
            && wallets.iter().zip(&self.wallets).all(|(a, b)| a.id == b.id);
        if unchanged {
            return false;
        }

        self.initial = Self::initial_screen(&wallets);
        self.current = self.initial.clone();
        self.wallets = wallets;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ck_wallet_core::mock::MockFactory;

    fn wallet(id: &str) -> Arc<WalletConfig> {
        Arc::new(MockFactory::resolving(id, "0xABC").config())
    }

    fn selectable(id: &str) -> Arc<WalletConfig> {
        Arc::new(MockFactory::resolving(id, "0xABC").config().with_select_ui())
    }

    #[test]
    fn initial_screen_is_deterministic() {
        assert_eq!(ScreenNavigator::initial_screen(&[]), Screen::Main);
        assert_eq!(
            ScreenNavigator::initial_screen(&[wallet("a")]),
            Screen::Wallet(wallet("a"))
        );
        assert_eq!(ScreenNavigator::initial_screen(&[selectable("a")]), Screen::Main);
        assert_eq!(ScreenNavigator::initial_screen(&[wallet("a"), wallet("b")]), Screen::Main);
    }

    #[test]
    fn select_back_and_get_started() -> anyhow::Result<()> {
        let mut navigator = ScreenNavigator::new(vec![wallet("a"), wallet("b")]);
        assert_eq!(navigator.current(), &Screen::Main);

        assert!(navigator.show_get_started());
        assert_eq!(navigator.current(), &Screen::GetStarted);
        assert!(!navigator.show_get_started());

        navigator.select_wallet(&WalletId::new("b"))?;
        assert_eq!(navigator.current(), &Screen::Wallet(wallet("b")));
        assert!(!navigator.show_get_started());

        assert_eq!(navigator.go_back(), &Screen::Main);
        Ok(())
    }

    #[test]
    fn unknown_wallet_is_rejected() {
        let mut navigator = ScreenNavigator::new(vec![wallet("a"), wallet("b")]);
        let err = navigator.select_wallet(&WalletId::new("zzz")).unwrap_err();
        assert!(matches!(err, ConnectError::UnknownWallet(_)));
        assert_eq!(navigator.current(), &Screen::Main);
    }

    #[test]
    fn back_from_single_wallet_stays_on_it() {
        let mut navigator = ScreenNavigator::new(vec![wallet("a")]);
        assert_eq!(navigator.go_back(), &Screen::Wallet(wallet("a")));
    }

    #[test]
    fn wallet_changes_reset_only_when_ids_change() -> anyhow::Result<()> {
        let mut navigator = ScreenNavigator::new(vec![wallet("a"), wallet("b")]);
        navigator.select_wallet(&WalletId::new("b"))?;

        assert!(!navigator.set_wallets(vec![wallet("a"), wallet("b")]));
        assert_eq!(navigator.current(), &Screen::Wallet(wallet("b")));

        assert!(navigator.set_wallets(vec![wallet("a")]));
        assert_eq!(navigator.initial(), &Screen::Wallet(wallet("a")));
        assert_eq!(navigator.current(), &Screen::Wallet(wallet("a")));
        Ok(())
    }
}
