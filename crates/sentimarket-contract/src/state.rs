//! Contract binding state machine
//!
//! `Ready` is reachable only through a successful binding probe issued after
//! the most recent `BindStarted`; code presence alone never counts.

use alloy_primitives::Address;
use sentimarket_types::ErrorInfo;
use serde::{Deserialize, Serialize};

/// Binding status of the contract session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingStatus {
    #[default]
    Idle,
    Binding,
    Ready,
    Error,
}

/// Observable contract session state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContractSessionState {
    pub status: BindingStatus,
    pub bound_address: Option<Address>,
    pub last_error: Option<ErrorInfo>,
}

impl ContractSessionState {
    pub fn is_ready(&self) -> bool {
        self.status == BindingStatus::Ready
    }
}

/// Inputs to the binding state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingEvent {
    /// A new signer is available; binding to `address` begins
    BindStarted { address: Address },
    /// The read-only probe returned
    ProbeSucceeded,
    /// Handle construction or the probe failed
    BindFailed(ErrorInfo),
    /// The wallet left `Connected`
    Unbound,
}

/// Apply one event to the current state
pub fn reduce(state: &ContractSessionState, event: &BindingEvent) -> ContractSessionState {
    match (state.status, event) {
        (_, BindingEvent::BindStarted { address }) => ContractSessionState {
            status: BindingStatus::Binding,
            bound_address: Some(*address),
            last_error: None,
        },
        (BindingStatus::Binding, BindingEvent::ProbeSucceeded) => ContractSessionState {
            status: BindingStatus::Ready,
            ..state.clone()
        },
        (BindingStatus::Binding, BindingEvent::BindFailed(error)) => ContractSessionState {
            status: BindingStatus::Error,
            bound_address: state.bound_address,
            last_error: Some(error.clone()),
        },
        (_, BindingEvent::Unbound) => ContractSessionState::default(),
        _ => state.clone(),
    }
}
