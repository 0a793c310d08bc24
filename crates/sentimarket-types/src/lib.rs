//! SentiMarket Types - Canonical domain types for the sentiment marketplace
//!
//! This crate contains the foundational types shared by every session
//! component, with zero dependencies on other sentimarket crates:
//!
//! - EVM primitives (`Address`, `B256`, `U256`) re-exported from `alloy-primitives`
//! - Native-unit amount conversion (18 decimals)
//! - Read-only projections of contract state (`Agent`, `PlatformStats`)
//! - Sentiment results emitted by the off-chain worker
//! - Network presets
//! - The error taxonomy shared by all sessions
//!
//! # Session Layering
//!
//! ```text
//! WalletSession → ContractSession → LivenessMonitor
//! ```

pub mod agent;
pub mod amount;
pub mod error;
pub mod network;
pub mod sentiment;

pub use agent::*;
pub use amount::*;
pub use error::*;
pub use network::*;
pub use sentiment::*;

pub use alloy_primitives::{Address, B256, U256};

/// Version of the SentiMarket types schema
pub const TYPES_VERSION: &str = "0.1.0";

/// Shorten an address for display, e.g. `0x1234...abcd`.
pub fn short_address(address: &Address) -> String {
    let full = format!("{address:#x}");
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_address_keeps_prefix_and_suffix() {
        let address: Address = "0x00000000000000000000000000000000deadbeef"
            .parse()
            .unwrap();
        assert_eq!(short_address(&address), "0x0000...beef");
    }
}
