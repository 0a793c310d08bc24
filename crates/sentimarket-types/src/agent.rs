//! Read-only projections of marketplace contract state

use crate::{format_native, short_address, MarketError, Result};
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of an agent in the contract's agent array
pub type AgentId = u64;

/// An agent registered in the marketplace.
///
/// Never mutated locally: the marketplace view is a point-in-time
/// snapshot, re-fetched on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    /// On-chain index
    pub id: AgentId,
    /// Account that registered the agent
    pub owner: Address,
    /// Inference endpoint (usually a model URL)
    pub model_endpoint: String,
    /// Price per request in wei
    pub price: U256,
    /// Whether the agent accepts requests
    pub active: bool,
}

impl Agent {
    /// Price as a decimal string in native units
    pub fn price_display(&self) -> String {
        format_native(self.price)
    }

    /// Whether a request carrying `payment` would be accepted
    pub fn accepts_payment(&self, payment: U256) -> bool {
        self.active && payment == self.price
    }

    /// Model identifier from the endpoint's last path segment
    pub fn model_id(&self) -> &str {
        self.model_endpoint
            .trim_end_matches('/')
            .rsplit("/models/")
            .next()
            .unwrap_or(&self.model_endpoint)
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} ({}, owner {}{})",
            self.id,
            self.model_endpoint,
            self.price_display(),
            short_address(&self.owner),
            if self.active { "" } else { ", inactive" }
        )
    }
}

/// Platform-wide counters read from the contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlatformStats {
    pub agent_count: u64,
    pub request_count: u64,
    /// Platform fee in basis points
    pub fee_bps: u64,
    /// Accumulated fees in wei
    pub total_fees: U256,
}

/// One platform-stats read, including the worker-enabled flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlatformStatsReading {
    pub stats: PlatformStats,
    pub worker_enabled: bool,
}

/// Check that a model endpoint is an `http(s)://` URL
pub fn validate_model_endpoint(endpoint: &str) -> Result<()> {
    let trimmed = endpoint.trim();
    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() && !host.contains(char::is_whitespace) => Ok(()),
        _ => Err(MarketError::invalid_input(
            "model_endpoint",
            "must be an http(s):// URL",
        )),
    }
}
