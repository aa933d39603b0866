use ck_api_types::ChainId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chain {
    pub chain_id: ChainId,
    pub name: String,
    pub rpc_url: String,
    pub native_currency: NativeCurrency,
    #[serde(default)]
    pub testnet: bool,
}

impl Chain {
    fn eth_chain(chain_id: u64, name: &str, rpc_url: &str, testnet: bool) -> Self {
        Self {
            chain_id: ChainId(chain_id),
            name: name.to_owned(),
            rpc_url: rpc_url.to_owned(),
            native_currency: NativeCurrency {
                name: "Ether".to_owned(),
                symbol: "ETH".to_owned(),
                decimals: 18,
            },
            testnet,
        }
    }
}

pub const ETHEREUM: ChainId = ChainId(1);
pub const POLYGON: ChainId = ChainId(137);
pub const BASE: ChainId = ChainId(8453);
pub const SEPOLIA: ChainId = ChainId(11_155_111);

/// Chains a connection session may be switched to.
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: BTreeMap<ChainId, Chain>,
    default_chain: ChainId,
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ChainRegistry {
    pub fn empty(default_chain: Chain) -> Self {
        let default_id = default_chain.chain_id;
        let mut chains = BTreeMap::new();
        chains.insert(default_id, default_chain);
        Self {
            chains,
            default_chain: default_id,
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty(Chain::eth_chain(
            ETHEREUM.0,
            "Ethereum Mainnet",
            "https://ethereum-rpc.publicnode.com",
            false,
        ));
        registry.register(Chain {
            chain_id: POLYGON,
            name: "Polygon Mainnet".to_owned(),
            rpc_url: "https://polygon-rpc.com".to_owned(),
            native_currency: NativeCurrency {
                name: "MATIC".to_owned(),
                symbol: "MATIC".to_owned(),
                decimals: 18,
            },
            testnet: false,
        });
        registry.register(Chain::eth_chain(BASE.0, "Base", "https://mainnet.base.org", false));
        registry.register(Chain::eth_chain(
            SEPOLIA.0,
            "Sepolia",
            "https://rpc.sepolia.org",
            true,
        ));
        registry
    }

    pub fn register(&mut self, chain: Chain) {
        self.chains.insert(chain.chain_id, chain);
    }

    /// Fails when the chain is not registered; the current default is kept.
    pub fn set_default(&mut self, chain_id: ChainId) -> bool {
        if self.chains.contains_key(&chain_id) {
            self.default_chain = chain_id;
            true
        } else {
            false
        }
    }

    pub fn get(&self, chain_id: ChainId) -> Option<&Chain> {
        self.chains.get(&chain_id)
    }

    pub fn contains(&self, chain_id: ChainId) -> bool {
        self.chains.contains_key(&chain_id)
    }

    pub fn default_chain(&self) -> ChainId {
        self.default_chain
    }

    pub fn chains(&self) -> impl Iterator<Item = &Chain> {
        self.chains.values()
    }
}
