//! CLI configuration
//!
//! Flags come from clap with `SENTIMARKET_*` environment fallbacks; `.env`
//! is loaded before parsing. Sub-configs for the RPC transport, liveness
//! monitor and inference backend read their own variables through their
//! `Default` impls.

use alloy_primitives::Address;
use anyhow::Context;
use clap::Args;
use sentimarket_inference::InferenceConfig;
use sentimarket_liveness::LivenessConfig;
use sentimarket_rpc::RpcConfig;
use sentimarket_types::NetworkConfig;
use std::str::FromStr;

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// JSON-RPC endpoint (defaults to the selected network's public endpoint)
    #[arg(long, global = true, env = "SENTIMARKET_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Marketplace contract address
    #[arg(long, global = true, env = "SENTIMARKET_CONTRACT_ADDRESS")]
    pub contract: Option<String>,

    /// Network preset: sapphire-testnet, sapphire-mainnet or localnet
    #[arg(long, global = true, env = "SENTIMARKET_NETWORK", default_value = "sapphire-testnet")]
    pub network: String,

    /// Account to use when the endpoint authorizes several
    #[arg(long, global = true, env = "SENTIMARKET_ACCOUNT")]
    pub account: Option<String>,

    /// Run against an in-memory wallet and chain
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, env = "SENTIMARKET_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Log format: pretty or json
    #[arg(long, global = true, env = "SENTIMARKET_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

/// Resolved application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub rpc: RpcConfig,
    pub contract_address: Option<Address>,
    pub account: Option<Address>,
    pub simulate: bool,
    pub json: bool,
    pub logging: LoggingConfig,
    pub liveness: LivenessConfig,
    pub inference: InferenceConfig,
}

impl AppConfig {
    pub fn from_args(args: &GlobalArgs) -> anyhow::Result<Self> {
        let network = NetworkConfig::from_name(&args.network)?;
        let rpc_url = args
            .rpc_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| network.rpc_url.clone());

        let contract_address = parse_address(args.contract.as_deref())
            .context("invalid contract address")?;
        let account = parse_address(args.account.as_deref()).context("invalid account address")?;

        Ok(Self {
            network,
            rpc: RpcConfig::with_url(rpc_url),
            contract_address,
            account,
            simulate: args.simulate,
            json: args.json,
            logging: LoggingConfig {
                level: args.log_level.clone(),
                format: args.log_format.clone(),
            },
            liveness: LivenessConfig::default(),
            inference: InferenceConfig::default(),
        })
    }

    /// The contract address, which every chain command needs
    pub fn require_contract(&self) -> anyhow::Result<Address> {
        self.contract_address.context(
            "no contract address configured; pass --contract or set SENTIMARKET_CONTRACT_ADDRESS",
        )
    }
}

fn parse_address(raw: Option<&str>) -> anyhow::Result<Option<Address>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Ok(Some(Address::from_str(raw)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> GlobalArgs {
        GlobalArgs {
            rpc_url: None,
            contract: Some("0x00000000000000000000000000000000000000cc".to_string()),
            network: "sapphire-testnet".to_string(),
            account: None,
            simulate: false,
            json: false,
            log_level: "warn".to_string(),
            log_format: "pretty".to_string(),
        }
    }

    #[test]
    fn test_rpc_url_defaults_to_network() {
        let config = AppConfig::from_args(&args()).unwrap();
        assert_eq!(config.network.chain_id, 23295);
        assert_eq!(config.rpc.url, config.network.rpc_url);
        assert_eq!(
            config.require_contract().unwrap(),
            Address::with_last_byte(0xcc)
        );
    }

    #[test]
    fn test_explicit_rpc_url_wins() {
        let mut args = args();
        args.rpc_url = Some("http://localhost:8545".to_string());
        args.network = "localnet".to_string();
        let config = AppConfig::from_args(&args).unwrap();
        assert_eq!(config.rpc.url, "http://localhost:8545");
        assert_eq!(config.network.chain_id, 1337);
    }

    #[test]
    fn test_rejects_bad_input() {
        let mut bad_address = args();
        bad_address.contract = Some("0x1234".to_string());
        assert!(AppConfig::from_args(&bad_address).is_err());

        let mut bad_network = args();
        bad_network.network = "goerli".to_string();
        assert!(AppConfig::from_args(&bad_network).is_err());

        let mut missing = args();
        missing.contract = None;
        let config = AppConfig::from_args(&missing).unwrap();
        assert!(config.require_contract().is_err());
    }
}
