use ck_api_types::{WalletId, WalletMetadata};
use std::fmt;
use std::sync::Arc;

use crate::{CreateOptions, Wallet, WalletError, WalletFactory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperFlavor {
    SmartAccount,
    Safe,
}

#[derive(Clone)]
pub enum WalletKind {
    Personal,
    Wrapper {
        flavor: WrapperFlavor,
        personal_wallets: Vec<Arc<WalletConfig>>,
    },
}

type InstalledCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// Static description of a wallet the user can pick.
#[derive(Clone)]
pub struct WalletConfig {
    pub id: WalletId,
    pub metadata: WalletMetadata,
    pub kind: WalletKind,
    /// Renders its own selection control inside the wallet list.
    pub select_ui: bool,
    factory: Arc<dyn WalletFactory>,
    installed: Option<InstalledCheck>,
}

impl WalletConfig {
    pub fn personal(
        id: impl Into<String>,
        metadata: WalletMetadata,
        factory: impl WalletFactory + 'static,
    ) -> Self {
        Self {
            id: WalletId::new(id),
            metadata,
            kind: WalletKind::Personal,
            select_ui: false,
            factory: Arc::new(factory),
            installed: None,
        }
    }

    pub fn wrapper(
        id: impl Into<String>,
        metadata: WalletMetadata,
        flavor: WrapperFlavor,
        personal_wallets: Vec<WalletConfig>,
        factory: impl WalletFactory + 'static,
    ) -> Self {
        Self {
            id: WalletId::new(id),
            metadata,
            kind: WalletKind::Wrapper {
                flavor,
                personal_wallets: personal_wallets.into_iter().map(Arc::new).collect(),
            },
            select_ui: false,
            factory: Arc::new(factory),
            installed: None,
        }
    }

    pub fn with_select_ui(mut self) -> Self {
        self.select_ui = true;
        self
    }

    pub fn with_installed_check(
        mut self,
        check: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Self {
        self.installed = Some(Arc::new(check));
        self
    }

    pub fn is_installed(&self) -> bool {
        self.installed.as_ref().map(|check| check()).unwrap_or(true)
    }

    pub fn is_wrapper(&self) -> bool {
        matches!(self.kind, WalletKind::Wrapper { .. })
    }

    pub fn personal_wallets(&self) -> &[Arc<WalletConfig>] {
        match &self.kind {
            WalletKind::Personal => &[],
            WalletKind::Wrapper { personal_wallets, .. } => personal_wallets,
        }
    }

    pub fn personal_wallet(&self, id: &WalletId) -> Option<Arc<WalletConfig>> {
        self.personal_wallets().iter().find(|config| &config.id == id).cloned()
    }

    pub fn create(&self, options: CreateOptions) -> Result<Arc<dyn Wallet>, WalletError> {
        self.factory.create(options)
    }
}

impl fmt::Debug for WalletConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            WalletKind::Personal => "personal".to_owned(),
            WalletKind::Wrapper { flavor, personal_wallets } => {
                let ids: Vec<&str> =
                    personal_wallets.iter().map(|config| config.id.as_str()).collect();
                format!("wrapper({flavor:?}: {})", ids.join(","))
            }
        };
        f.debug_struct("WalletConfig")
            .field("id", &self.id)
            .field("name", &self.metadata.name)
            .field("kind", &kind)
            .field("select_ui", &self.select_ui)
            .finish()
    }
}
