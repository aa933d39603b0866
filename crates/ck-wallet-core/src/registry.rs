use ck_api_types::WalletId;
use std::collections::HashSet;
use std::sync::Arc;

use crate::{RegistryError, WalletConfig, WalletKind};

/// Ordered, validated set of wallets offered to the user.
#[derive(Debug, Clone, Default)]
pub struct WalletRegistry {
    wallets: Vec<Arc<WalletConfig>>,
}

impl WalletRegistry {
    pub fn new(configs: Vec<WalletConfig>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        for config in &configs {
            if !seen.insert(config.id.clone()) {
                return Err(RegistryError::DuplicateWalletId(config.id.clone()));
            }
            validate_wrapper(config)?;
        }

        Ok(Self {
            wallets: configs.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn list(&self) -> &[Arc<WalletConfig>] {
        &self.wallets
    }

    pub fn get(&self, id: &WalletId) -> Option<Arc<WalletConfig>> {
        self.wallets.iter().find(|config| &config.id == id).cloned()
    }

    pub fn ids(&self) -> Vec<WalletId> {
        self.wallets.iter().map(|config| config.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}

fn validate_wrapper(config: &WalletConfig) -> Result<(), RegistryError> {
    let WalletKind::Wrapper { personal_wallets, .. } = &config.kind else {
        return Ok(());
    };

    if personal_wallets.is_empty() {
        return Err(RegistryError::EmptyPersonalWallets(config.id.clone()));
    }

    let mut seen = HashSet::new();
    for personal in personal_wallets {
        if personal.is_wrapper() {
            return Err(RegistryError::NestedWrapper {
                wrapper: config.id.clone(),
                personal: personal.id.clone(),
            });
        }
        if !seen.insert(personal.id.clone()) {
            return Err(RegistryError::DuplicateWalletId(personal.id.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WrapperFlavor;
    use crate::mock::MockFactory;

    fn personal(id: &str) -> WalletConfig {
        MockFactory::resolving(id, "0xABC").config()
    }

    #[test]
    fn preserves_registration_order() -> anyhow::Result<()> {
        let registry = WalletRegistry::new(vec![personal("b"), personal("a"), personal("c")])?;
        let ids: Vec<String> = registry.ids().into_iter().map(|id| id.0).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        Ok(())
    }

    #[test]
    fn duplicate_ids_are_a_configuration_error() {
        let err =
            WalletRegistry::new(vec![personal("metamask"), personal("metamask")]).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateWalletId(WalletId::new("metamask")));
    }

    #[test]
    fn wrapper_needs_personal_wallets() {
        let safe =
            MockFactory::wrapper("safe", "0x123").wrapper_config(WrapperFlavor::Safe, vec![]);
        let err = WalletRegistry::new(vec![safe]).unwrap_err();
        assert_eq!(err, RegistryError::EmptyPersonalWallets(WalletId::new("safe")));
    }

    #[test]
    fn wrappers_cannot_nest() {
        let inner = MockFactory::wrapper("smart", "0x1")
            .wrapper_config(WrapperFlavor::SmartAccount, vec![personal("local")]);
        let outer =
            MockFactory::wrapper("safe", "0x2").wrapper_config(WrapperFlavor::Safe, vec![inner]);
        let err = WalletRegistry::new(vec![outer]).unwrap_err();
        assert!(matches!(err, RegistryError::NestedWrapper { .. }));
    }

    #[test]
    fn lookup_covers_top_level_wallets_only() -> anyhow::Result<()> {
        let safe = MockFactory::wrapper("safe", "0x123")
            .wrapper_config(WrapperFlavor::Safe, vec![personal("wallet-a")]);
        let registry = WalletRegistry::new(vec![safe, personal("wallet-b")])?;

        assert!(registry.get(&WalletId::new("wallet-a")).is_none());
        assert!(registry.get(&WalletId::new("wallet-b")).is_some());
        let safe = registry.get(&WalletId::new("safe")).expect("wrapper registered");
        assert!(safe.personal_wallet(&WalletId::new("wallet-a")).is_some());
        Ok(())
    }
}
