//! SentiMarket State - Session composition root
//!
//! Builds the session stack once and owns it for the lifetime of the
//! application:
//!
//! ```text
//! WalletSession → ContractSession → LivenessMonitor
//!        \               |                /
//!         +---------> SessionEvent bus <-+
//! ```
//!
//! Each session publishes through its own `watch` channel. Forwarder tasks
//! owned by [`MarketplaceSession`] re-publish every change, plus every result
//! event, on one `broadcast` bus so the CLI (or any other surface) can follow
//! the whole stack from a single receiver.

pub mod events;

pub use events::SessionEvent;

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sentimarket_contract::{
    BindingStatus, ContractConnector, ContractSession, ContractSessionState, ContractView, RpcConnector,
    SimulatedChain, SimulatedConnector, SubscriptionHandle,
};
use sentimarket_liveness::{LivenessConfig, LivenessMonitor, LivenessSnapshot};
use sentimarket_rpc::{RpcClient, RpcConfig};
use sentimarket_types::{MarketError, Result};
use sentimarket_wallet::{
    JsonRpcWalletProvider, SimulatedWalletProvider, WalletProvider, WalletSession,
    WalletSessionState, WalletView,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Capacity of the session event bus
pub const EVENT_BUS_CAPACITY: usize = 1000;

/// What a [`MarketplaceSession`] binds to
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub contract_address: Address,
    pub liveness: LivenessConfig,
}

impl SessionConfig {
    pub fn new(contract_address: Address) -> Self {
        Self {
            contract_address,
            liveness: LivenessConfig::default(),
        }
    }

    pub fn with_liveness(mut self, liveness: LivenessConfig) -> Self {
        self.liveness = liveness;
        self
    }
}

/// Point-in-time view over every session, for status output
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub contract_address: Address,
    pub wallet: WalletSessionState,
    pub wallet_generation: u64,
    pub contract: ContractSessionState,
    pub binding_id: u64,
    pub liveness: LivenessSnapshot,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: u64,
}

/// The result subscription feeding the bus
struct ResultFeed {
    handle: Mutex<Option<SubscriptionHandle>>,
    /// Binding the current subscription belongs to; 0 before the first
    binding: watch::Sender<u64>,
}

impl ResultFeed {
    fn new() -> Self {
        Self {
            handle: Mutex::new(None),
            binding: watch::channel(0).0,
        }
    }
}

/// Owns the wallet, contract and liveness sessions and their event bus
pub struct MarketplaceSession {
    wallet: WalletSession,
    contract: ContractSession,
    liveness: LivenessMonitor,
    events: broadcast::Sender<SessionEvent>,
    results: Arc<ResultFeed>,
    forwarders: Mutex<Vec<JoinHandle<()>>>,
    started_at: DateTime<Utc>,
}

impl MarketplaceSession {
    /// Build the stack over an injected provider and contract connector.
    ///
    /// `None` models an environment without a wallet provider. Must be
    /// called inside a tokio runtime.
    pub fn new(
        provider: Option<Arc<dyn WalletProvider>>,
        connector: Arc<dyn ContractConnector>,
        config: SessionConfig,
    ) -> Self {
        let wallet = WalletSession::new(provider);
        let contract = ContractSession::attach(wallet.clone(), connector, config.contract_address);
        let liveness = LivenessMonitor::attach(&contract, config.liveness);
        let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        let results = Arc::new(ResultFeed::new());

        let forwarders = vec![
            tokio::spawn(forward_wallet(wallet.subscribe(), events.clone())),
            tokio::spawn(forward_contract(
                contract.clone(),
                contract.subscribe(),
                events.clone(),
                Arc::clone(&results),
            )),
            tokio::spawn(forward_liveness(liveness.subscribe(), events.clone())),
        ];

        info!(contract = %config.contract_address, "Marketplace session started");
        Self {
            wallet,
            contract,
            liveness,
            events,
            results,
            forwarders: Mutex::new(forwarders),
            started_at: Utc::now(),
        }
    }

    /// Build the stack over a JSON-RPC endpoint that manages accounts.
    ///
    /// The wallet provider and the contract binding share one client.
    pub fn over_rpc(rpc: &RpcConfig, account: Option<Address>, config: SessionConfig) -> Self {
        let client = Arc::new(RpcClient::from_config(rpc));
        let provider = JsonRpcWalletProvider::with_client(
            Arc::clone(&client),
            rpc.notification_poll_interval,
        )
        .with_preferred_account(account);
        let connector = RpcConnector::with_client(client, rpc);
        Self::new(Some(Arc::new(provider)), Arc::new(connector), config)
    }

    /// Build the stack over an in-memory wallet and chain
    pub fn simulated(
        provider: Arc<SimulatedWalletProvider>,
        chain: Arc<SimulatedChain>,
        liveness: LivenessConfig,
    ) -> Self {
        let config = SessionConfig::new(chain.address()).with_liveness(liveness);
        Self::new(
            Some(provider as Arc<dyn WalletProvider>),
            Arc::new(SimulatedConnector::new(chain)),
            config,
        )
    }

    pub fn wallet(&self) -> &WalletSession {
        &self.wallet
    }

    pub fn contract(&self) -> &ContractSession {
        &self.contract
    }

    pub fn liveness(&self) -> &LivenessMonitor {
        &self.liveness
    }

    /// Subscribe to every session change from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Connect the wallet and wait for the contract binding to settle.
    ///
    /// Returns the contract view once a bind for the connected wallet
    /// generation is `Ready` or `Error`; views left over from an earlier
    /// connection are skipped. A failed wallet handshake is returned as is.
    /// When `Ready`, result events are already flowing to the bus.
    pub async fn connect(&self) -> Result<ContractView> {
        self.wallet.connect().await?;
        let generation = self.wallet.view().generation;
        let mut views = self.contract.subscribe();
        let view = views
            .wait_for(|view| {
                let settled = matches!(
                    view.state.status,
                    BindingStatus::Ready | BindingStatus::Error
                );
                let wallet = self.wallet.view();
                // the wallet moved on; nothing more will settle for this generation
                let superseded = !wallet.state.is_connected() || wallet.generation != generation;
                (settled && view.wallet_generation >= generation) || superseded
            })
            .await
            .map_err(|_| MarketError::ContractNotReady)?
            .clone();

        if view.state.is_ready() {
            let mut feed = self.results.binding.subscribe();
            // stop waiting if this binding is replaced before it is fed
            tokio::select! {
                _ = feed.wait_for(|binding| *binding >= view.binding_id) => {}
                _ = views.wait_for(|v| v.binding_id != view.binding_id || !v.state.is_ready()) => {}
            }
        }
        Ok(view)
    }

    pub fn status(&self) -> SessionStatus {
        let wallet = self.wallet.view();
        let contract = self.contract.view();
        let uptime = Utc::now() - self.started_at;
        SessionStatus {
            contract_address: self.contract.address(),
            wallet: wallet.state,
            wallet_generation: wallet.generation,
            contract: contract.state,
            binding_id: contract.binding_id,
            liveness: self.liveness.snapshot(),
            started_at: self.started_at,
            uptime_seconds: uptime.num_seconds().max(0) as u64,
        }
    }

    /// Stop every task and disconnect the wallet.
    ///
    /// Subscribers see a final [`SessionEvent::SessionStopped`].
    pub fn shutdown(&self) {
        self.stop_tasks();
        self.wallet.disconnect();
        let _ = self.events.send(SessionEvent::SessionStopped {
            timestamp: Utc::now(),
        });
        info!("Marketplace session stopped");
    }

    fn stop_tasks(&self) {
        for forwarder in self.forwarders.lock().drain(..) {
            forwarder.abort();
        }
        if let Some(results) = self.results.handle.lock().take() {
            results.cancel();
        }
        self.liveness.shutdown();
        self.contract.shutdown();
    }
}

impl Drop for MarketplaceSession {
    fn drop(&mut self) {
        self.stop_tasks();
    }
}

async fn forward_wallet(
    mut views: watch::Receiver<WalletView>,
    events: broadcast::Sender<SessionEvent>,
) {
    while views.changed().await.is_ok() {
        let view = views.borrow_and_update().clone();
        // Ignore send errors (no receivers)
        let _ = events.send(SessionEvent::WalletChanged {
            state: view.state,
            generation: view.generation,
            timestamp: Utc::now(),
        });
    }
}

/// Re-publishes contract views and keeps one result subscription per binding.
///
/// The subscription is opened before the `Ready` view is re-published, so a
/// receiver that has seen `ContractChanged { Ready }` will see every result
/// emitted after it.
async fn forward_contract(
    contract: ContractSession,
    mut views: watch::Receiver<ContractView>,
    events: broadcast::Sender<SessionEvent>,
    results: Arc<ResultFeed>,
) {
    let mut subscribed_binding = 0;
    while views.changed().await.is_ok() {
        let view = views.borrow_and_update().clone();

        if view.state.is_ready() && view.binding_id != subscribed_binding {
            subscribed_binding = view.binding_id;
            let bus = events.clone();
            let subscription = contract.subscribe_to_results(move |result| {
                let _ = bus.send(SessionEvent::ResultReceived {
                    result,
                    timestamp: Utc::now(),
                });
            });
            match subscription {
                Ok(handle) => {
                    if let Some(previous) = results.handle.lock().replace(handle) {
                        previous.cancel();
                    }
                    results.binding.send_replace(view.binding_id);
                }
                Err(err) => debug!(error = %err, "Binding superseded before results were subscribed"),
            }
        }

        let _ = events.send(SessionEvent::ContractChanged {
            state: view.state,
            binding_id: view.binding_id,
            timestamp: Utc::now(),
        });
    }
}

async fn forward_liveness(
    mut snapshots: watch::Receiver<LivenessSnapshot>,
    events: broadcast::Sender<SessionEvent>,
) {
    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();
        let _ = events.send(SessionEvent::LivenessUpdated {
            snapshot,
            timestamp: Utc::now(),
        });
    }
}
