//! Session events for streaming to watchers
//!
//! Every change published by the wallet, contract and liveness sessions is
//! re-published here as one tagged event, so a consumer can follow the whole
//! stack from a single `broadcast` receiver.

use chrono::{DateTime, Utc};
use sentimarket_contract::{BindingStatus, ContractSessionState};
use sentimarket_liveness::LivenessSnapshot;
use sentimarket_types::{short_address, SentimentResult};
use sentimarket_wallet::{ConnectionStatus, WalletSessionState};
use serde::{Deserialize, Serialize};

/// Events broadcast by a [`crate::MarketplaceSession`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// Wallet session state was replaced
    WalletChanged {
        state: WalletSessionState,
        generation: u64,
        timestamp: DateTime<Utc>,
    },

    /// Contract binding state was replaced
    ContractChanged {
        state: ContractSessionState,
        binding_id: u64,
        timestamp: DateTime<Utc>,
    },

    /// A new liveness snapshot was published
    LivenessUpdated {
        snapshot: LivenessSnapshot,
        timestamp: DateTime<Utc>,
    },

    /// The worker wrote a sentiment result back to the chain
    ResultReceived {
        result: SentimentResult,
        timestamp: DateTime<Utc>,
    },

    /// The session was shut down; no further events follow
    SessionStopped { timestamp: DateTime<Utc> },
}

impl SessionEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            SessionEvent::WalletChanged { timestamp, .. } => *timestamp,
            SessionEvent::ContractChanged { timestamp, .. } => *timestamp,
            SessionEvent::LivenessUpdated { timestamp, .. } => *timestamp,
            SessionEvent::ResultReceived { timestamp, .. } => *timestamp,
            SessionEvent::SessionStopped { timestamp } => *timestamp,
        }
    }

    /// Get a short description for logging
    pub fn summary(&self) -> String {
        match self {
            SessionEvent::WalletChanged { state, .. } => match (state.status, state.connection()) {
                (ConnectionStatus::Connected, Some((account, chain_id))) => {
                    format!("Wallet connected: {} on chain {}", short_address(&account), chain_id)
                }
                (ConnectionStatus::Error, _) => format!(
                    "Wallet error: {}",
                    state
                        .last_error
                        .as_ref()
                        .map(|e| e.message.as_str())
                        .unwrap_or("unknown")
                ),
                (status, _) => format!("Wallet {}", status_label(status)),
            },
            SessionEvent::ContractChanged {
                state, binding_id, ..
            } => match state.status {
                BindingStatus::Ready => format!("Contract ready (binding #{binding_id})"),
                BindingStatus::Error => format!(
                    "Contract error: {}",
                    state
                        .last_error
                        .as_ref()
                        .map(|e| e.message.as_str())
                        .unwrap_or("unknown")
                ),
                BindingStatus::Binding => "Contract binding".to_string(),
                BindingStatus::Idle => "Contract idle".to_string(),
            },
            SessionEvent::LivenessUpdated { snapshot, .. } => {
                let online = if snapshot.is_online { "online" } else { "offline" };
                match &snapshot.last_error {
                    Some(error) => format!("Worker {online} (refresh failed: {})", error.message),
                    None => format!(
                        "Worker {online}, {} processed, {} agents",
                        snapshot.processed_count, snapshot.platform_stats.agent_count
                    ),
                }
            }
            SessionEvent::ResultReceived { result, .. } => format!(
                "Result for request {}: {} ({}%)",
                result.request_id, result.sentiment, result.confidence
            ),
            SessionEvent::SessionStopped { .. } => "Session stopped".to_string(),
        }
    }

    /// One line of JSON, for newline-delimited output
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn status_label(status: ConnectionStatus) -> &'static str {
    match status {
        ConnectionStatus::Disconnected => "disconnected",
        ConnectionStatus::Connecting => "connecting",
        ConnectionStatus::Connected => "connected",
        ConnectionStatus::Error => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};

    #[test]
    fn test_event_serialization() {
        let event = SessionEvent::WalletChanged {
            state: WalletSessionState {
                status: ConnectionStatus::Connected,
                account: Some(Address::repeat_byte(0xa1)),
                chain_id: Some(23295),
                last_error: None,
            },
            generation: 1,
            timestamp: Utc::now(),
        };

        let json = event.to_json_line().unwrap();
        assert!(json.contains("\"type\":\"WalletChanged\""));
        assert!(json.contains("23295"));

        let back: SessionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.summary(), event.summary());
    }

    #[test]
    fn test_event_summary() {
        let result = SentimentResult::from_raw(U256::from(7u64), "POSITIVE", U256::from(93u64), Utc::now());
        let event = SessionEvent::ResultReceived {
            result,
            timestamp: Utc::now(),
        };

        let summary = event.summary();
        assert!(summary.contains("request 7"));
        assert!(summary.contains("positive"));
        assert!(summary.contains("93%"));

        let stopped = SessionEvent::SessionStopped {
            timestamp: Utc::now(),
        };
        assert_eq!(stopped.summary(), "Session stopped");
    }
}
