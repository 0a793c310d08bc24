//! Wallet session state machine
//!
//! A pure `state + event -> state` transition function. The async adapter in
//! [`crate::session`] feeds it provider results and notifications; nothing in
//! here touches a provider or a runtime.
//!
//! ```text
//! Disconnected --ConnectStarted--> Connecting --Connected--> Connected
//!                                  Connecting --ConnectFailed--> Error
//! any --Disconnected / AccountsChanged([])--> Disconnected
//! Connected --ChainChanged--> Connected (chain id updated in place)
//! ```

use alloy_primitives::Address;
use sentimarket_types::ErrorInfo;
use serde::{Deserialize, Serialize};

/// Connection status of the wallet session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Observable wallet session state.
///
/// `account` and `chain_id` are set exactly when `status` is `Connected`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WalletSessionState {
    pub status: ConnectionStatus,
    pub account: Option<Address>,
    pub chain_id: Option<u64>,
    pub last_error: Option<ErrorInfo>,
}

impl WalletSessionState {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Account and chain, when connected
    pub fn connection(&self) -> Option<(Address, u64)> {
        match (self.status, self.account, self.chain_id) {
            (ConnectionStatus::Connected, Some(account), Some(chain_id)) => {
                Some((account, chain_id))
            }
            _ => None,
        }
    }
}

/// Inputs to the wallet state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    /// A handshake with the provider has begun
    ConnectStarted,
    /// The handshake produced an authorized account on a chain
    Connected { account: Address, chain_id: u64 },
    /// The handshake failed
    ConnectFailed(ErrorInfo),
    /// Explicit disconnect
    Disconnected,
    /// Provider pushed a new account list
    AccountsChanged(Vec<Address>),
    /// Provider pushed a new chain id
    ChainChanged(u64),
}

/// Follow-up work the adapter must perform after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEffect {
    /// Re-run the handshake for a different authorized account
    Reconnect { account: Address },
}

/// Result of one reduction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: WalletSessionState,
    pub effect: Option<WalletEffect>,
}

impl Transition {
    fn to(state: WalletSessionState) -> Self {
        Self {
            state,
            effect: None,
        }
    }
}

/// Apply one event to the current state.
///
/// Events that do not make sense in the current state (a late `Connected`
/// after a disconnect, a chain change while disconnected) leave it unchanged.
pub fn reduce(state: &WalletSessionState, event: &WalletEvent) -> Transition {
    use ConnectionStatus::*;

    match (state.status, event) {
        (_, WalletEvent::ConnectStarted) => Transition::to(WalletSessionState {
            status: Connecting,
            ..WalletSessionState::default()
        }),

        (Connecting, WalletEvent::Connected { account, chain_id }) => {
            Transition::to(WalletSessionState {
                status: Connected,
                account: Some(*account),
                chain_id: Some(*chain_id),
                last_error: None,
            })
        }

        (Connecting, WalletEvent::ConnectFailed(error)) => Transition::to(WalletSessionState {
            status: Error,
            last_error: Some(error.clone()),
            ..WalletSessionState::default()
        }),

        (_, WalletEvent::Disconnected) => Transition::to(WalletSessionState::default()),

        (_, WalletEvent::AccountsChanged(accounts)) if accounts.is_empty() => {
            Transition::to(WalletSessionState::default())
        }

        (Connected, WalletEvent::AccountsChanged(accounts)) => {
            let next = accounts[0];
            if state.account == Some(next) {
                Transition::to(state.clone())
            } else {
                Transition {
                    state: state.clone(),
                    effect: Some(WalletEffect::Reconnect { account: next }),
                }
            }
        }

        (Connected, WalletEvent::ChainChanged(chain_id)) => Transition::to(WalletSessionState {
            chain_id: Some(*chain_id),
            ..state.clone()
        }),

        _ => Transition::to(state.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentimarket_types::{ErrorKind, MarketError};

    fn alice() -> Address {
        Address::repeat_byte(0xa1)
    }

    fn bob() -> Address {
        Address::repeat_byte(0xb0)
    }

    fn connected(account: Address, chain_id: u64) -> WalletSessionState {
        let connecting = reduce(&WalletSessionState::default(), &WalletEvent::ConnectStarted).state;
        reduce(&connecting, &WalletEvent::Connected { account, chain_id }).state
    }

    fn invariant_holds(state: &WalletSessionState) -> bool {
        let connected = state.status == ConnectionStatus::Connected;
        state.account.is_some() == connected && state.chain_id.is_some() == connected
    }

    #[test]
    fn test_connect_lifecycle() {
        let state = connected(alice(), 23295);
        assert_eq!(state.status, ConnectionStatus::Connected);
        assert_eq!(state.connection(), Some((alice(), 23295)));

        let state = reduce(&state, &WalletEvent::Disconnected).state;
        assert_eq!(state, WalletSessionState::default());
    }

    #[test]
    fn test_connect_failure_enters_error() {
        let connecting = reduce(&WalletSessionState::default(), &WalletEvent::ConnectStarted).state;
        let info = MarketError::NoAccountsAuthorized.info();
        let state = reduce(&connecting, &WalletEvent::ConnectFailed(info)).state;
        assert_eq!(state.status, ConnectionStatus::Error);
        assert_eq!(
            state.last_error.as_ref().map(|e| e.kind),
            Some(ErrorKind::NoAccountsAuthorized)
        );
        assert!(state.account.is_none());
    }

    #[test]
    fn test_late_connected_is_ignored_after_disconnect() {
        let state = reduce(
            &WalletSessionState::default(),
            &WalletEvent::Connected {
                account: alice(),
                chain_id: 1,
            },
        )
        .state;
        assert_eq!(state.status, ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_chain_changed_updates_in_place() {
        let state = connected(alice(), 23295);
        let state = reduce(&state, &WalletEvent::ChainChanged(23294)).state;
        assert_eq!(state.status, ConnectionStatus::Connected);
        assert_eq!(state.account, Some(alice()));
        assert_eq!(state.chain_id, Some(23294));

        let idle = reduce(&WalletSessionState::default(), &WalletEvent::ChainChanged(5)).state;
        assert_eq!(idle.chain_id, None);
    }

    #[test]
    fn test_accounts_changed() {
        let state = connected(alice(), 23295);

        let same = reduce(&state, &WalletEvent::AccountsChanged(vec![alice()]));
        assert_eq!(same.effect, None);
        assert_eq!(same.state, state);

        let switched = reduce(&state, &WalletEvent::AccountsChanged(vec![bob(), alice()]));
        assert_eq!(switched.effect, Some(WalletEffect::Reconnect { account: bob() }));

        let emptied = reduce(&state, &WalletEvent::AccountsChanged(vec![]));
        assert_eq!(emptied.state.status, ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_account_invariant_over_event_sequences() {
        let events = [
            WalletEvent::ConnectStarted,
            WalletEvent::Connected {
                account: alice(),
                chain_id: 23295,
            },
            WalletEvent::ChainChanged(1337),
            WalletEvent::AccountsChanged(vec![bob()]),
            WalletEvent::Disconnected,
            WalletEvent::Disconnected,
            WalletEvent::ConnectStarted,
            WalletEvent::ConnectFailed(MarketError::ProviderUnavailable.info()),
            WalletEvent::Connected {
                account: bob(),
                chain_id: 23295,
            },
            WalletEvent::ConnectStarted,
            WalletEvent::Connected {
                account: bob(),
                chain_id: 23295,
            },
            WalletEvent::AccountsChanged(vec![]),
        ];

        // each rotation of the sequence, checked after every step
        for start in 0..events.len() {
            let mut state = WalletSessionState::default();
            for event in events.iter().cycle().skip(start).take(events.len()) {
                state = reduce(&state, event).state;
                assert!(invariant_holds(&state), "invariant broken after {event:?}");
            }
        }
    }
}
