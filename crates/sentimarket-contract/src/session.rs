//! ContractSession - verified contract binding on top of the wallet session
//!
//! A reactor task follows the wallet's [`WalletView`]. Every new connected
//! generation (new account or new chain) tears the previous binding down,
//! builds a fresh handle and probes it with `agent_count`; the handle is only
//! published once that probe returns. Leaving `Connected` unbinds.

use crate::binding::{ContractConnector, MarketplaceContract, MarketplaceEvent};
use crate::state::{reduce, BindingEvent, BindingStatus, ContractSessionState};
use crate::subscription::{Subscription, SubscriptionHandle};
use alloy_primitives::{Address, B256};
use parking_lot::Mutex;
use sentimarket_types::{
    parse_native, validate_model_endpoint, Agent, AgentId, MarketError, Result, SentimentResult,
};
use sentimarket_wallet::{TransactionSigner, WalletSession, WalletView};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Upper bound on the agent list pre-allocation; the count is chain input
const MAX_PREALLOCATED_AGENTS: u64 = 1024;

/// A probed contract handle and the wallet identity it was bound for
#[derive(Clone)]
pub struct BoundContract {
    pub handle: Arc<dyn MarketplaceContract>,
    pub wallet_generation: u64,
    pub account: Address,
    pub chain_id: u64,
}

impl std::fmt::Debug for BoundContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundContract")
            .field("address", &self.handle.address())
            .field("wallet_generation", &self.wallet_generation)
            .field("account", &self.account)
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

/// Snapshot of the contract session
#[derive(Debug, Clone, Default)]
pub struct ContractView {
    pub state: ContractSessionState,
    /// Present exactly when `state` is `Ready`
    pub contract: Option<BoundContract>,
    /// Incremented on every transition into `Ready`
    pub binding_id: u64,
    /// Wallet generation of the most recent bind attempt, kept through
    /// `Error` so callers can tell a fresh failure from a stale one
    pub wallet_generation: u64,
}

/// Read-only health report for the configured contract
#[derive(Debug, Clone, Serialize)]
pub struct ContractDiagnostics {
    pub address: Address,
    pub chain_id: u64,
    pub account: Address,
    pub binding: BindingStatus,
    pub code_size: Option<usize>,
    pub agent_count: Option<u64>,
    pub first_agent_readable: bool,
    pub errors: Vec<String>,
}

impl ContractDiagnostics {
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty() && self.code_size.is_some_and(|size| size > 0)
    }
}

struct Inner {
    address: Address,
    connector: Arc<dyn ContractConnector>,
    wallet: WalletSession,
    view: watch::Sender<ContractView>,
    op_lock: tokio::sync::Mutex<()>,
    subscriptions: Mutex<Vec<Arc<Subscription>>>,
    next_subscription: AtomicU64,
    reactor: Mutex<Option<JoinHandle<()>>>,
}

/// Contract session bound to one configured marketplace address
#[derive(Clone)]
pub struct ContractSession {
    inner: Arc<Inner>,
}

impl ContractSession {
    /// Create the session and start following `wallet`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn attach(
        wallet: WalletSession,
        connector: Arc<dyn ContractConnector>,
        address: Address,
    ) -> Self {
        let (view, _) = watch::channel(ContractView::default());
        let inner = Arc::new(Inner {
            address,
            connector,
            wallet,
            view,
            op_lock: tokio::sync::Mutex::new(()),
            subscriptions: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            reactor: Mutex::new(None),
        });

        let rx = inner.wallet.subscribe();
        let reactor = tokio::spawn(run_reactor(Arc::downgrade(&inner), rx));
        *inner.reactor.lock() = Some(reactor);
        Self { inner }
    }

    pub fn address(&self) -> Address {
        self.inner.address
    }

    pub fn state(&self) -> ContractSessionState {
        self.inner.view.borrow().state.clone()
    }

    pub fn view(&self) -> ContractView {
        self.inner.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ContractView> {
        self.inner.view.subscribe()
    }

    pub fn wallet(&self) -> &WalletSession {
        &self.inner.wallet
    }

    /// Whether a user operation currently holds the session
    pub fn operation_in_flight(&self) -> bool {
        self.inner.op_lock.try_lock().is_err()
    }

    /// Stop following the wallet and drop the binding
    pub fn shutdown(&self) {
        if let Some(reactor) = self.inner.reactor.lock().take() {
            reactor.abort();
        }
        self.inner.unbind();
        debug!(address = %self.inner.address, "Contract session shut down");
    }

    /// Register a new agent and wait for the transaction to be included.
    ///
    /// `price` is a decimal amount in native units. Nothing is cached
    /// locally; re-enumerate to see the new agent.
    pub async fn register_agent(&self, model_endpoint: &str, price: &str) -> Result<B256> {
        let _guard = self.begin("register_agent")?;
        let contract = self.inner.ready_contract()?;

        validate_model_endpoint(model_endpoint)?;
        let price_wei = parse_native(price)?;
        if price_wei.is_zero() {
            return Err(MarketError::InvalidAmount {
                input: price.to_string(),
                reason: "price must be greater than zero".to_string(),
            });
        }

        let tx_hash = contract
            .handle
            .register_agent(model_endpoint.trim(), price_wei)
            .await?;
        info!(tx_hash = %tx_hash, price, "Agent registered");
        Ok(tx_hash)
    }

    /// Pay `payment` (decimal native units) for a sentiment request.
    ///
    /// The chain decides whether the payment matches the agent's price; a
    /// mismatch comes back as `CallReverted`.
    pub async fn request_sentiment(
        &self,
        agent_id: AgentId,
        text: &str,
        payment: &str,
    ) -> Result<B256> {
        let _guard = self.begin("request_sentiment")?;
        let contract = self.inner.ready_contract()?;

        if text.trim().is_empty() {
            return Err(MarketError::invalid_input("text", "must not be empty"));
        }
        let payment_wei = parse_native(payment)?;

        let tx_hash = contract
            .handle
            .request_sentiment(agent_id, text, payment_wei)
            .await?;
        info!(tx_hash = %tx_hash, agent_id, payment, "Sentiment requested");
        Ok(tx_hash)
    }

    /// Read every agent in on-chain index order.
    ///
    /// One round trip per agent; callers should cache the result.
    pub async fn enumerate_agents(&self) -> Result<Vec<Agent>> {
        let contract = self.inner.ready_contract()?;
        let count = contract.handle.agent_count().await?;
        let mut agents = Vec::with_capacity(count.min(MAX_PREALLOCATED_AGENTS) as usize);
        for index in 0..count {
            agents.push(contract.handle.agent(index).await?);
        }
        debug!(count, "Agents enumerated");
        Ok(agents)
    }

    /// Deliver every result event from now on to `callback`.
    ///
    /// The subscription lives until its handle is cancelled or the session
    /// unbinds, whichever comes first.
    pub fn subscribe_to_results<F>(&self, callback: F) -> Result<SubscriptionHandle>
    where
        F: Fn(SentimentResult) + Send + Sync + 'static,
    {
        let contract = self.inner.ready_contract()?;
        let id = self.inner.next_subscription.fetch_add(1, Ordering::Relaxed);
        let subscription = Subscription::new(id);
        let mut events = contract.handle.events();

        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(MarketplaceEvent::SentimentResult(result)) => callback(result),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(subscription = id, skipped, "Result subscription lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        subscription.attach(task);

        let mut registry = self.inner.subscriptions.lock();
        registry.retain(|sub| !sub.is_cancelled());
        registry.push(Arc::clone(&subscription));
        debug!(subscription = id, "Result subscription opened");
        Ok(SubscriptionHandle::new(subscription))
    }

    /// Probe the configured address with a fresh handle.
    ///
    /// Needs a connected wallet but not a ready binding, so it can explain
    /// why binding failed. Session state is not touched.
    pub async fn diagnose(&self) -> Result<ContractDiagnostics> {
        let (signer, account, chain_id) = self
            .inner
            .wallet
            .view()
            .connected()
            .ok_or(MarketError::ContractNotReady)?;

        let mut report = ContractDiagnostics {
            address: self.inner.address,
            chain_id,
            account,
            binding: self.state().status,
            code_size: None,
            agent_count: None,
            first_agent_readable: false,
            errors: Vec::new(),
        };

        let handle = match self
            .inner
            .connector
            .connect(self.inner.address, signer, chain_id)
            .await
        {
            Ok(handle) => handle,
            Err(err) => {
                report.errors.push(format!("connect: {err}"));
                return Ok(report);
            }
        };

        match handle.code_size().await {
            Ok(0) => {
                report.code_size = Some(0);
                report
                    .errors
                    .push(format!("no contract code at {} on chain {chain_id}", self.inner.address));
            }
            Ok(size) => report.code_size = Some(size),
            Err(err) => report.errors.push(format!("getCode: {err}")),
        }
        match handle.agent_count().await {
            Ok(count) => {
                report.agent_count = Some(count);
                if count > 0 {
                    match handle.agent(0).await {
                        Ok(_) => report.first_agent_readable = true,
                        Err(err) => report.errors.push(format!("agents(0): {err}")),
                    }
                }
            }
            Err(err) => report.errors.push(format!("getAgentCount: {err}")),
        }
        handle.close();
        Ok(report)
    }

    fn begin(&self, operation: &'static str) -> Result<tokio::sync::MutexGuard<'_, ()>> {
        self.inner
            .op_lock
            .try_lock()
            .map_err(|_| MarketError::OperationInProgress { operation })
    }
}

impl Inner {
    /// The published handle, if it still belongs to the current wallet identity
    fn ready_contract(&self) -> Result<BoundContract> {
        let view = self.view.borrow();
        let contract = match (&view.state.status, &view.contract) {
            (BindingStatus::Ready, Some(contract)) => contract.clone(),
            _ => return Err(MarketError::ContractNotReady),
        };
        drop(view);

        // The reactor may not have observed a wallet change yet.
        let wallet = self.wallet.view();
        if !wallet.state.is_connected() || wallet.generation != contract.wallet_generation {
            return Err(MarketError::ContractNotReady);
        }
        Ok(contract)
    }

    /// Apply a binding event and publish the resulting view
    fn dispatch(
        &self,
        event: BindingEvent,
        contract: Option<BoundContract>,
        generation: Option<u64>,
    ) -> ContractSessionState {
        let mut retired = None;
        self.view.send_if_modified(|view| {
            let next = reduce(&view.state, &event);
            let generation = generation.unwrap_or(view.wallet_generation);
            if next == view.state && generation == view.wallet_generation {
                return false;
            }
            view.wallet_generation = generation;
            if next.is_ready() {
                view.contract = contract;
                view.binding_id += 1;
            } else {
                retired = view.contract.take();
            }
            view.state = next;
            true
        });
        if let Some(old) = retired {
            old.handle.close();
        }
        self.view.borrow().state.clone()
    }

    fn teardown_subscriptions(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        let cancelled = subscriptions.iter().filter(|sub| sub.cancel()).count();
        if cancelled > 0 {
            debug!(cancelled, "Result subscriptions torn down");
        }
    }

    async fn bind(
        &self,
        signer: Arc<dyn TransactionSigner>,
        account: Address,
        chain_id: u64,
        generation: u64,
    ) {
        self.teardown_subscriptions();
        self.dispatch(
            BindingEvent::BindStarted { address: self.address },
            None,
            Some(generation),
        );
        debug!(address = %self.address, account = %account, chain_id, "Binding contract");

        match self.probe(signer, chain_id).await {
            Ok((handle, agent_count)) => {
                let bound = BoundContract {
                    handle: Arc::clone(&handle),
                    wallet_generation: generation,
                    account,
                    chain_id,
                };
                if self
                    .dispatch(BindingEvent::ProbeSucceeded, Some(bound), Some(generation))
                    .is_ready()
                {
                    info!(address = %self.address, chain_id, agent_count, "Contract bound");
                } else {
                    handle.close();
                }
            }
            Err(err) => {
                warn!(address = %self.address, chain_id, error = %err, "Contract binding failed");
                self.dispatch(BindingEvent::BindFailed(err.info()), None, Some(generation));
            }
        }
    }

    /// Build a handle and confirm it is callable
    async fn probe(
        &self,
        signer: Arc<dyn TransactionSigner>,
        chain_id: u64,
    ) -> Result<(Arc<dyn MarketplaceContract>, u64)> {
        let handle = self
            .connector
            .connect(self.address, signer, chain_id)
            .await
            .map_err(|err| self.binding_failure(chain_id, err))?;
        match handle.agent_count().await {
            Ok(count) => Ok((handle, count)),
            Err(err) => {
                handle.close();
                Err(self.binding_failure(chain_id, err))
            }
        }
    }

    fn binding_failure(&self, chain_id: u64, err: MarketError) -> MarketError {
        match err {
            MarketError::BindingFailed { .. } => err,
            other => MarketError::BindingFailed {
                address: self.address.to_string(),
                reason: format!(
                    "probe call failed: {other}; check that the contract is deployed at this address on chain {chain_id}"
                ),
            },
        }
    }

    fn unbind(&self) {
        self.teardown_subscriptions();
        let previous = self.view.borrow().state.status;
        self.dispatch(BindingEvent::Unbound, None, None);
        if previous != BindingStatus::Idle {
            info!(address = %self.address, "Contract unbound");
        }
    }
}

/// Follow wallet views until the session or the wallet goes away
async fn run_reactor(session: Weak<Inner>, mut wallet: watch::Receiver<WalletView>) {
    let mut bound_generation = None;
    loop {
        let view = wallet.borrow_and_update().clone();
        let Some(inner) = session.upgrade() else {
            break;
        };

        match view.connected() {
            Some((signer, account, chain_id)) if bound_generation != Some(view.generation) => {
                tokio::select! {
                    _ = inner.bind(signer, account, chain_id, view.generation) => {
                        bound_generation = Some(view.generation);
                    }
                    changed = wallet.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        debug!(generation = view.generation, "Binding superseded by wallet change");
                        continue;
                    }
                }
            }
            Some(_) => {}
            None => {
                bound_generation = None;
                if inner.view.borrow().state.status != BindingStatus::Idle {
                    inner.unbind();
                }
            }
        }

        drop(inner);
        if wallet.changed().await.is_err() {
            break;
        }
    }
    debug!("Contract reactor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimulatedChain, SimulatedConnector};
    use sentimarket_types::{parse_native, ErrorKind, RevertReason};
    use sentimarket_wallet::{SimulatedWalletProvider, WalletProvider};
    use tokio::sync::mpsc;

    const CHAIN: u64 = 23295;

    fn contract_address() -> Address {
        Address::repeat_byte(0xcc)
    }

    fn alice() -> Address {
        Address::repeat_byte(0xa1)
    }

    fn bob() -> Address {
        Address::repeat_byte(0xb0)
    }

    struct Fixture {
        provider: Arc<SimulatedWalletProvider>,
        chain: Arc<SimulatedChain>,
        wallet: WalletSession,
        session: ContractSession,
    }

    fn fixture(wallet_chain: u64) -> Fixture {
        let provider = Arc::new(SimulatedWalletProvider::new(vec![alice(), bob()], wallet_chain));
        let chain = Arc::new(SimulatedChain::new(contract_address(), CHAIN));
        let wallet = WalletSession::new(Some(provider.clone() as Arc<dyn WalletProvider>));
        let session = ContractSession::attach(
            wallet.clone(),
            Arc::new(SimulatedConnector::new(chain.clone())),
            contract_address(),
        );
        Fixture {
            provider,
            chain,
            wallet,
            session,
        }
    }

    async fn wait_status(session: &ContractSession, status: BindingStatus) -> ContractView {
        session
            .subscribe()
            .wait_for(|view| view.state.status == status)
            .await
            .unwrap()
            .clone()
    }

    #[tokio::test]
    async fn test_binds_after_wallet_connects() {
        let fx = fixture(CHAIN);
        assert_eq!(fx.session.state().status, BindingStatus::Idle);
        assert!(matches!(
            fx.session.enumerate_agents().await,
            Err(MarketError::ContractNotReady)
        ));

        fx.wallet.connect().await.unwrap();
        let view = wait_status(&fx.session, BindingStatus::Ready).await;
        assert_eq!(view.state.bound_address, Some(contract_address()));
        assert_eq!(view.binding_id, 1);
        let bound = view.contract.unwrap();
        assert_eq!(bound.account, alice());
        assert_eq!(bound.chain_id, CHAIN);
        // the probe was the only read so far
        assert_eq!(fx.chain.read_count(), 1);
    }

    #[tokio::test]
    async fn test_wrong_network_is_binding_failure() {
        let fx = fixture(1);
        fx.wallet.connect().await.unwrap();

        let view = wait_status(&fx.session, BindingStatus::Error).await;
        assert!(view.contract.is_none());
        assert_eq!(view.state.bound_address, Some(contract_address()));
        let error = view.state.last_error.unwrap();
        assert_eq!(error.kind, ErrorKind::BindingFailed);
        assert!(error.message.contains("chain 1"));
        assert!(matches!(
            fx.session.register_agent("https://example.com/m", "0.1").await,
            Err(MarketError::ContractNotReady)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_invalidates_handle_immediately() {
        let fx = fixture(CHAIN);
        fx.wallet.connect().await.unwrap();
        wait_status(&fx.session, BindingStatus::Ready).await;

        fx.wallet.disconnect();
        // checked before the reactor has had a chance to run
        assert!(matches!(
            fx.session.register_agent("https://example.com/m", "0.1").await,
            Err(MarketError::ContractNotReady)
        ));

        let view = wait_status(&fx.session, BindingStatus::Idle).await;
        assert!(view.contract.is_none());
        assert!(view.state.bound_address.is_none());
    }

    #[tokio::test]
    async fn test_enumerate_agents_in_index_order() {
        let fx = fixture(CHAIN);
        fx.wallet.connect().await.unwrap();
        wait_status(&fx.session, BindingStatus::Ready).await;
        assert!(fx.session.enumerate_agents().await.unwrap().is_empty());

        for (i, price) in ["0.1", "0.2", "0.3"].iter().enumerate() {
            fx.chain.seed_agent(
                alice(),
                &format!("https://example.com/models/m{i}"),
                parse_native(price).unwrap(),
            );
        }
        let agents = fx.session.enumerate_agents().await.unwrap();
        assert_eq!(agents.iter().map(|a| a.id).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(agents[1].price_display(), "0.2");
    }

    #[tokio::test]
    async fn test_implausible_agent_count_fails_instead_of_allocating() {
        let fx = fixture(CHAIN);
        fx.chain.misreport_agent_count(Some(u64::MAX / 2));
        fx.wallet.connect().await.unwrap();
        wait_status(&fx.session, BindingStatus::Ready).await;

        let err = fx.session.enumerate_agents().await.unwrap_err();
        assert!(matches!(err, MarketError::CallReverted { .. }));

        fx.chain.misreport_agent_count(None);
        assert!(fx.session.enumerate_agents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_payment_reverts_without_side_effects() {
        let fx = fixture(CHAIN);
        fx.chain
            .seed_agent(bob(), "https://example.com/models/a", parse_native("0.2").unwrap());
        fx.wallet.connect().await.unwrap();
        wait_status(&fx.session, BindingStatus::Ready).await;

        let before = fx.session.enumerate_agents().await.unwrap();
        let err = fx
            .session
            .request_sentiment(0, "great product", "0.1")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MarketError::CallReverted {
                reason: RevertReason::InsufficientPayment
            }
        ));
        assert_eq!(fx.session.enumerate_agents().await.unwrap(), before);
        assert_eq!(fx.chain.request_count(), 0);

        fx.session
            .request_sentiment(0, "great product", "0.2")
            .await
            .unwrap();
        assert_eq!(fx.chain.request_count(), 1);
    }

    #[tokio::test]
    async fn test_register_agent_validates_input() {
        let fx = fixture(CHAIN);
        fx.wallet.connect().await.unwrap();
        wait_status(&fx.session, BindingStatus::Ready).await;

        assert!(matches!(
            fx.session.register_agent("ftp://nope", "0.1").await,
            Err(MarketError::InvalidInput { .. })
        ));
        assert!(matches!(
            fx.session.register_agent("https://example.com/m", "0").await,
            Err(MarketError::InvalidAmount { .. })
        ));
        assert!(matches!(
            fx.session.request_sentiment(0, "   ", "0.1").await,
            Err(MarketError::InvalidInput { .. })
        ));

        fx.session
            .register_agent("https://example.com/models/new", "0.05")
            .await
            .unwrap();
        let agents = fx.session.enumerate_agents().await.unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].owner, alice());
    }

    #[tokio::test]
    async fn test_concurrent_operation_is_rejected() {
        let fx = fixture(CHAIN);
        fx.chain
            .seed_agent(bob(), "https://example.com/models/a", parse_native("0.2").unwrap());
        fx.wallet.connect().await.unwrap();
        wait_status(&fx.session, BindingStatus::Ready).await;

        fx.chain.hold_writes();
        let first = {
            let session = fx.session.clone();
            tokio::spawn(async move {
                session
                    .register_agent("https://example.com/models/b", "0.1")
                    .await
            })
        };
        while !fx.session.operation_in_flight() {
            tokio::task::yield_now().await;
        }

        assert!(matches!(
            fx.session.request_sentiment(0, "text", "0.2").await,
            Err(MarketError::OperationInProgress {
                operation: "request_sentiment"
            })
        ));

        fx.chain.release_writes();
        first.await.unwrap().unwrap();
        assert_eq!(fx.chain.agents().len(), 2);
    }

    #[tokio::test]
    async fn test_result_subscription_delivery_and_cancel() {
        let fx = fixture(CHAIN);
        fx.wallet.connect().await.unwrap();
        wait_status(&fx.session, BindingStatus::Ready).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = fx
            .session
            .subscribe_to_results(move |result| {
                let _ = tx.send(result);
            })
            .unwrap();

        let emitted = fx.chain.emit_result(7, "POSITIVE", 93);
        let received = rx.recv().await.unwrap();
        assert_eq!(received, emitted);

        handle.cancel();
        handle.cancel();
        fx.chain.emit_result(8, "negative", 50);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_account_switch_rebinds_and_drops_subscriptions() {
        let fx = fixture(CHAIN);
        fx.wallet.connect().await.unwrap();
        wait_status(&fx.session, BindingStatus::Ready).await;
        let handle = fx.session.subscribe_to_results(|_| {}).unwrap();

        let mut rx = fx.session.subscribe();
        fx.provider.set_accounts(vec![bob()]);
        let view = rx
            .wait_for(|view| {
                view.contract
                    .as_ref()
                    .is_some_and(|contract| contract.account == bob())
            })
            .await
            .unwrap()
            .clone();
        assert_eq!(view.binding_id, 2);
        assert_eq!(view.wallet_generation, 2);
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_diagnose_reports_without_mutating_state() {
        let fx = fixture(1);
        assert!(matches!(
            fx.session.diagnose().await,
            Err(MarketError::ContractNotReady)
        ));

        fx.wallet.connect().await.unwrap();
        wait_status(&fx.session, BindingStatus::Error).await;
        let report = fx.session.diagnose().await.unwrap();
        assert_eq!(report.code_size, Some(0));
        assert_eq!(report.binding, BindingStatus::Error);
        assert!(report.agent_count.is_none());
        assert!(!report.is_healthy());
        assert_eq!(fx.session.state().status, BindingStatus::Error);
    }

    #[tokio::test]
    async fn test_shutdown_unbinds_and_stops_following() {
        let fx = fixture(CHAIN);
        fx.wallet.connect().await.unwrap();
        wait_status(&fx.session, BindingStatus::Ready).await;

        fx.session.shutdown();
        assert_eq!(fx.session.state().status, BindingStatus::Idle);

        fx.wallet.disconnect();
        fx.wallet.connect().await.unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(fx.session.state().status, BindingStatus::Idle);
    }
}
