//! WalletSession - async adapter around the wallet state machine
//!
//! Owns the provider handle, runs handshakes, listens for provider
//! notifications and publishes a [`WalletView`] through a watch channel.
//! Every update replaces the whole view.

use crate::provider::{ProviderNotification, TransactionSigner, WalletProvider};
use crate::state::{reduce, ConnectionStatus, WalletEffect, WalletEvent, WalletSessionState};
use alloy_primitives::Address;
use parking_lot::Mutex;
use sentimarket_types::{MarketError, NetworkConfig, Result};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Snapshot of the wallet session handed to downstream components
#[derive(Clone)]
pub struct WalletView {
    pub state: WalletSessionState,
    /// Present exactly when `state` is `Connected`
    pub signer: Option<Arc<dyn TransactionSigner>>,
    /// Incremented every time a new account/chain pair becomes connected
    pub generation: u64,
}

impl WalletView {
    fn initial() -> Self {
        Self {
            state: WalletSessionState::default(),
            signer: None,
            generation: 0,
        }
    }

    /// Signer, account and chain when connected
    pub fn connected(&self) -> Option<(Arc<dyn TransactionSigner>, Address, u64)> {
        let (account, chain_id) = self.state.connection()?;
        let signer = self.signer.clone()?;
        Some((signer, account, chain_id))
    }
}

impl std::fmt::Debug for WalletView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletView")
            .field("state", &self.state)
            .field("has_signer", &self.signer.is_some())
            .field("generation", &self.generation)
            .finish()
    }
}

struct Inner {
    provider: Option<Arc<dyn WalletProvider>>,
    view: watch::Sender<WalletView>,
    /// Serializes user-initiated operations
    op_lock: tokio::sync::Mutex<()>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// Single source of truth for the connected signing account and network
#[derive(Clone)]
pub struct WalletSession {
    inner: Arc<Inner>,
}

impl WalletSession {
    /// Create a session; `None` models an environment with no injected provider
    pub fn new(provider: Option<Arc<dyn WalletProvider>>) -> Self {
        let (view, _) = watch::channel(WalletView::initial());
        Self {
            inner: Arc::new(Inner {
                provider,
                view,
                op_lock: tokio::sync::Mutex::new(()),
                listener: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> WalletSessionState {
        self.inner.view.borrow().state.clone()
    }

    pub fn view(&self) -> WalletView {
        self.inner.view.borrow().clone()
    }

    /// Watch every view replacement
    pub fn subscribe(&self) -> watch::Receiver<WalletView> {
        self.inner.view.subscribe()
    }

    /// Request account access and connect.
    ///
    /// A no-op when already connected. A failed handshake leaves the session
    /// in `Error` with the failure recorded; the error is also returned.
    pub async fn connect(&self) -> Result<WalletSessionState> {
        let _guard = self
            .inner
            .op_lock
            .try_lock()
            .map_err(|_| MarketError::OperationInProgress {
                operation: "connect",
            })?;

        if self.state().is_connected() {
            debug!("connect called while already connected");
            return Ok(self.state());
        }

        self.stop_listener();
        self.inner.dispatch(WalletEvent::ConnectStarted, None);

        let Some(provider) = self.inner.provider.clone() else {
            let err = MarketError::ProviderUnavailable;
            self.inner
                .dispatch(WalletEvent::ConnectFailed(err.info()), None);
            return Err(err);
        };

        // Subscribe before the handshake so no change is missed in between.
        let notifications = provider.notifications();

        match Inner::handshake(provider.as_ref(), None).await {
            Ok((account, chain_id, signer)) => {
                let state = self
                    .inner
                    .dispatch(WalletEvent::Connected { account, chain_id }, Some(signer))
                    .state;
                if !state.is_connected() {
                    return Err(MarketError::provider("connection attempt was superseded"));
                }
                info!(account = %account, chain_id, provider = provider.name(), "Wallet connected");
                self.start_listener(notifications);
                Ok(state)
            }
            Err(err) => {
                warn!(error = %err, "Wallet connection failed");
                self.inner
                    .dispatch(WalletEvent::ConnectFailed(err.info()), None);
                Err(err)
            }
        }
    }

    /// Reset to the initial state. Idempotent.
    pub fn disconnect(&self) {
        self.stop_listener();
        self.inner.dispatch(WalletEvent::Disconnected, None);
        info!("Wallet disconnected");
    }

    /// Ask the provider to add and switch to `network`.
    ///
    /// Best-effort: the user may decline, so failures are logged and never
    /// returned. Session state is not touched here; an accepted switch comes
    /// back as a chain-changed notification.
    pub async fn switch_network(&self, network: &NetworkConfig) {
        let Some(provider) = self.inner.provider.as_ref() else {
            warn!(chain_id = network.chain_id, "Cannot switch network: no wallet provider");
            return;
        };
        if let Err(err) = provider.add_chain(network).await {
            warn!(chain_id = network.chain_id, error = %err, "Add chain request failed");
        }
        match provider.switch_chain(network.chain_id).await {
            Ok(()) => info!(chain_id = network.chain_id, chain = %network.chain_name, "Network switch requested"),
            Err(err) => warn!(chain_id = network.chain_id, error = %err, "Network switch failed"),
        }
    }

    fn start_listener(&self, mut notifications: broadcast::Receiver<ProviderNotification>) {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            loop {
                match notifications.recv().await {
                    Ok(notification) => {
                        if !inner.handle_notification(notification).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Wallet notifications lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Wallet notification listener stopped");
        });
        if let Some(previous) = self.inner.listener.lock().replace(handle) {
            previous.abort();
        }
    }

    fn stop_listener(&self) {
        if let Some(handle) = self.inner.listener.lock().take() {
            handle.abort();
        }
    }
}

impl Inner {
    /// Apply an event and publish the resulting view
    fn dispatch(
        &self,
        event: WalletEvent,
        signer: Option<Arc<dyn TransactionSigner>>,
    ) -> crate::state::Transition {
        let mut outcome = None;
        self.view.send_if_modified(|view| {
            let transition = reduce(&view.state, &event);
            let next = transition.state.clone();
            outcome = Some(transition);

            if next == view.state {
                return false;
            }

            let identity_changed = next.connection() != view.state.connection();
            if next.is_connected() {
                if let (WalletEvent::Connected { .. }, Some(signer)) = (&event, signer) {
                    view.signer = Some(signer);
                }
                if identity_changed {
                    view.generation += 1;
                }
            } else {
                view.signer = None;
            }
            view.state = next;
            true
        });
        outcome.unwrap_or_else(|| crate::state::Transition {
            state: self.view.borrow().state.clone(),
            effect: None,
        })
    }

    async fn handshake(
        provider: &dyn WalletProvider,
        account: Option<Address>,
    ) -> Result<(Address, u64, Arc<dyn TransactionSigner>)> {
        let account = match account {
            Some(account) => account,
            None => provider
                .request_accounts()
                .await?
                .into_iter()
                .next()
                .ok_or(MarketError::NoAccountsAuthorized)?,
        };
        let chain_id = provider.get_network().await?;
        let signer = provider.get_signer(account).await?;
        Ok((account, chain_id, signer))
    }

    /// Apply a provider notification; returns false once the listener should stop
    async fn handle_notification(&self, notification: ProviderNotification) -> bool {
        let event = match notification {
            ProviderNotification::AccountsChanged(accounts) => {
                WalletEvent::AccountsChanged(accounts)
            }
            ProviderNotification::ChainChanged(chain_id) => WalletEvent::ChainChanged(chain_id),
        };
        let transition = self.dispatch(event.clone(), None);

        match (&event, transition.effect) {
            (_, Some(WalletEffect::Reconnect { account })) => {
                self.reconnect(account).await;
                true
            }
            (WalletEvent::ChainChanged(chain_id), None) => {
                info!(chain_id, "Wallet chain changed");
                true
            }
            (WalletEvent::AccountsChanged(_), None) => {
                if transition.state.status == ConnectionStatus::Disconnected {
                    info!("Wallet accounts cleared, session disconnected");
                    false
                } else {
                    true
                }
            }
            _ => true,
        }
    }

    /// Implicit reconnect after the provider switched accounts
    async fn reconnect(&self, account: Address) {
        let _guard = self.op_lock.lock().await;
        let Some(provider) = self.provider.clone() else {
            return;
        };
        self.dispatch(WalletEvent::ConnectStarted, None);
        match Self::handshake(provider.as_ref(), Some(account)).await {
            Ok((account, chain_id, signer)) => {
                self.dispatch(WalletEvent::Connected { account, chain_id }, Some(signer));
                info!(account = %account, chain_id, "Wallet account switched");
            }
            Err(err) => {
                warn!(error = %err, "Reconnect after account change failed");
                self.dispatch(WalletEvent::ConnectFailed(err.info()), None);
            }
        }
    }
}
