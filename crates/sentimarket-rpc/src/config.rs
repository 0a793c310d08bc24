//! JSON-RPC transport configuration

use std::time::Duration;

/// Configuration for the JSON-RPC transport and its pollers
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Node or signer endpoint
    pub url: String,
    /// How often `eth_getTransactionReceipt` is polled while awaiting inclusion
    pub receipt_poll_interval: Duration,
    /// How often the wallet provider polls `eth_accounts` / `eth_chainId`
    pub notification_poll_interval: Duration,
    /// How often the log follower polls for new blocks
    pub event_poll_interval: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("SENTIMARKET_RPC_URL")
                .unwrap_or_else(|_| "https://testnet.sapphire.oasis.io".to_string()),
            receipt_poll_interval: env_millis("SENTIMARKET_RECEIPT_POLL_MS", 1_000),
            notification_poll_interval: env_millis("SENTIMARKET_NOTIFICATION_POLL_MS", 2_000),
            event_poll_interval: env_millis("SENTIMARKET_EVENT_POLL_MS", 2_000),
        }
    }
}

impl RpcConfig {
    /// Defaults with an explicit endpoint
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

fn env_millis(key: &str, default: u64) -> Duration {
    let millis = std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default);
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_url_keeps_intervals() {
        let config = RpcConfig::with_url("http://localhost:8545");
        assert_eq!(config.url, "http://localhost:8545");
        assert!(config.receipt_poll_interval > Duration::ZERO);
        assert!(config.event_poll_interval > Duration::ZERO);
    }
}
