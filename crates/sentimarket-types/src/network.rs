//! Network presets for the chains the marketplace is deployed on

use crate::{MarketError, Result};
use serde::{Deserialize, Serialize};

/// Oasis Sapphire testnet
pub const SAPPHIRE_TESTNET_CHAIN_ID: u64 = 23295;
/// Oasis Sapphire mainnet
pub const SAPPHIRE_MAINNET_CHAIN_ID: u64 = 23294;
/// Local development chain
pub const LOCALNET_CHAIN_ID: u64 = 1337;

/// Native currency descriptor for `wallet_addEthereumChain`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Chain configuration used to add/switch a wallet's network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub chain_name: String,
    pub rpc_url: String,
    pub block_explorer_url: Option<String>,
    pub native_currency: NativeCurrency,
}

impl NetworkConfig {
    pub fn sapphire_testnet() -> Self {
        Self {
            chain_id: SAPPHIRE_TESTNET_CHAIN_ID,
            chain_name: "Oasis Sapphire Testnet".to_string(),
            rpc_url: "https://testnet.sapphire.oasis.io".to_string(),
            block_explorer_url: Some("https://explorer.oasis.io/testnet/sapphire".to_string()),
            native_currency: NativeCurrency {
                name: "TEST".to_string(),
                symbol: "TEST".to_string(),
                decimals: 18,
            },
        }
    }

    pub fn sapphire_mainnet() -> Self {
        Self {
            chain_id: SAPPHIRE_MAINNET_CHAIN_ID,
            chain_name: "Oasis Sapphire".to_string(),
            rpc_url: "https://sapphire.oasis.io".to_string(),
            block_explorer_url: Some("https://explorer.oasis.io/mainnet/sapphire".to_string()),
            native_currency: NativeCurrency {
                name: "ROSE".to_string(),
                symbol: "ROSE".to_string(),
                decimals: 18,
            },
        }
    }

    pub fn localnet() -> Self {
        Self {
            chain_id: LOCALNET_CHAIN_ID,
            chain_name: "Localnet".to_string(),
            rpc_url: "http://localhost:8545".to_string(),
            block_explorer_url: None,
            native_currency: NativeCurrency {
                name: "Ether".to_string(),
                symbol: "ETH".to_string(),
                decimals: 18,
            },
        }
    }

    /// Look up a preset by name (`sapphire-testnet`, `sapphire-mainnet`, `localnet`)
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().replace('_', "-").as_str() {
            "sapphire-testnet" | "testnet" => Ok(Self::sapphire_testnet()),
            "sapphire-mainnet" | "sapphire" | "mainnet" => Ok(Self::sapphire_mainnet()),
            "localnet" | "local" | "localhost" => Ok(Self::localnet()),
            other => Err(MarketError::config(format!("unknown network '{other}'"))),
        }
    }

    /// Look up a preset by chain id
    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        match chain_id {
            SAPPHIRE_TESTNET_CHAIN_ID => Some(Self::sapphire_testnet()),
            SAPPHIRE_MAINNET_CHAIN_ID => Some(Self::sapphire_mainnet()),
            LOCALNET_CHAIN_ID => Some(Self::localnet()),
            _ => None,
        }
    }

    /// Chain id as the `0x`-prefixed hex string wallets expect
    pub fn chain_id_hex(&self) -> String {
        format!("{:#x}", self.chain_id)
    }

    /// `wallet_addEthereumChain` parameter object
    pub fn add_chain_params(&self) -> serde_json::Value {
        let explorers: Vec<&str> = self.block_explorer_url.iter().map(String::as_str).collect();
        serde_json::json!({
            "chainId": self.chain_id_hex(),
            "chainName": self.chain_name,
            "rpcUrls": [self.rpc_url],
            "blockExplorerUrls": explorers,
            "nativeCurrency": {
                "name": self.native_currency.name,
                "symbol": self.native_currency.symbol,
                "decimals": self.native_currency.decimals,
            },
        })
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::sapphire_testnet()
    }
}
