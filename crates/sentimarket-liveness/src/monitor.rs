//! LivenessMonitor - polls and listens to infer worker health
//!
//! A supervisor task follows the contract session. For every new binding it
//! resets the snapshot and starts one worker task that owns both the poll
//! timer and the live event subscription; unbinding aborts that worker.

use crate::config::LivenessConfig;
use crate::snapshot::{LivenessSnapshot, RefreshReading, WorkerIdentity};
use chrono::Utc;
use parking_lot::Mutex;
use sentimarket_contract::{ContractSession, ContractView, MarketplaceContract, MarketplaceEvent};
use sentimarket_types::{MarketError, Result};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

struct Inner {
    config: LivenessConfig,
    snapshot: watch::Sender<LivenessSnapshot>,
    refresh_requested: Notify,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

/// Aborts the per-binding worker when dropped
struct Worker(JoinHandle<()>);

impl Drop for Worker {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Infers whether the off-chain worker is alive and making progress
#[derive(Clone)]
pub struct LivenessMonitor {
    inner: Arc<Inner>,
}

impl LivenessMonitor {
    /// Start following `contract`.
    ///
    /// Runs until [`shutdown`](Self::shutdown) or until the contract session
    /// is gone. Must be called inside a tokio runtime.
    pub fn attach(contract: &ContractSession, config: LivenessConfig) -> Self {
        let (snapshot, _) = watch::channel(LivenessSnapshot::default());
        let inner = Arc::new(Inner {
            config,
            snapshot,
            refresh_requested: Notify::new(),
            supervisor: Mutex::new(None),
        });
        let supervisor = tokio::spawn(supervise(Arc::clone(&inner), contract.subscribe()));
        *inner.supervisor.lock() = Some(supervisor);
        Self { inner }
    }

    pub fn config(&self) -> &LivenessConfig {
        &self.inner.config
    }

    pub fn snapshot(&self) -> LivenessSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LivenessSnapshot> {
        self.inner.snapshot.subscribe()
    }

    /// Refresh out of cycle.
    ///
    /// A request made while nothing is bound is dropped when the next
    /// binding starts, since that binding refreshes on start anyway.
    pub fn refresh_now(&self) {
        self.inner.refresh_requested.notify_one();
    }

    pub fn shutdown(&self) {
        if let Some(supervisor) = self.inner.supervisor.lock().take() {
            supervisor.abort();
        }
        self.inner.snapshot.send_replace(LivenessSnapshot::default());
    }
}

async fn supervise(inner: Arc<Inner>, mut contract: watch::Receiver<ContractView>) {
    let mut current: Option<(u64, Worker)> = None;
    loop {
        let view = contract.borrow_and_update().clone();
        match view.contract {
            Some(bound) => {
                if current.as_ref().map(|(id, _)| *id) != Some(view.binding_id) {
                    // drop the old worker before the new one publishes anything
                    drop(current.take());
                    inner.snapshot.send_replace(LivenessSnapshot::default());
                    let task = tokio::spawn(run_binding(Arc::clone(&inner), bound.handle));
                    current = Some((view.binding_id, Worker(task)));
                    debug!(binding_id = view.binding_id, "Liveness monitor started");
                }
            }
            None => {
                if current.take().is_some() {
                    inner.snapshot.send_replace(LivenessSnapshot::default());
                    debug!("Liveness monitor stopped");
                }
            }
        }
        if contract.changed().await.is_err() {
            break;
        }
    }
}

async fn run_binding(inner: Arc<Inner>, contract: Arc<dyn MarketplaceContract>) {
    // drain a refresh request left over from while nothing was bound
    tokio::select! {
        biased;
        _ = inner.refresh_requested.notified() => debug!("Dropped refresh request made before binding"),
        _ = std::future::ready(()) => {}
    }

    // subscribe first so nothing between the first scan and the first event is lost
    let mut events = contract.events();
    let mut events_open = true;
    let mut ticker = tokio::time::interval(inner.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => inner.refresh(contract.as_ref()).await,
            _ = inner.refresh_requested.notified() => {
                debug!("Manual liveness refresh");
                inner.refresh(contract.as_ref()).await;
            }
            event = events.recv(), if events_open => match event {
                Ok(MarketplaceEvent::SentimentResult(result)) => {
                    let at = Utc::now();
                    inner
                        .snapshot
                        .send_modify(|snapshot| *snapshot = snapshot.with_result(&result, at));
                    debug!(request_id = %result.request_id, sentiment = %result.sentiment, "Worker result observed");
                }
                Ok(MarketplaceEvent::WorkerRegistered { app_id, worker }) => {
                    info!(app_id = %app_id, worker = %worker, "Worker registered, refreshing liveness");
                    inner.refresh(contract.as_ref()).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Liveness event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    warn!("Contract event stream closed; continuing with polling only");
                    events_open = false;
                }
            },
        }
    }
}

impl Inner {
    async fn refresh(&self, contract: &dyn MarketplaceContract) {
        match self.read(contract).await {
            Ok(reading) => {
                let at = Utc::now();
                self.snapshot
                    .send_modify(|snapshot| *snapshot = snapshot.with_refresh(&reading, at));
                debug!(
                    head = reading.head,
                    window_events = reading.window_results.len(),
                    worker_enabled = reading.stats.worker_enabled,
                    "Liveness refreshed"
                );
            }
            Err(err) => {
                warn!(error = %err, "Liveness refresh failed");
                let info = transient(err).info();
                self.snapshot
                    .send_modify(|snapshot| *snapshot = snapshot.with_failure(info));
            }
        }
    }

    async fn read(&self, contract: &dyn MarketplaceContract) -> Result<RefreshReading> {
        let stats = contract.platform_stats().await?;
        let (identity, identity_error) = if stats.worker_enabled {
            match read_identity(contract).await {
                Ok(identity) => (Some(identity), None),
                Err(err) => {
                    warn!(error = %err, "Worker identity unreadable, publishing stats without it");
                    (None, Some(transient(err).info()))
                }
            }
        } else {
            (None, None)
        };
        let head = contract.block_number().await?;
        let from = head.saturating_sub(self.config.scan_window_blocks);
        let window_results = contract.result_events(from, head).await?;
        Ok(RefreshReading {
            stats,
            identity,
            identity_error,
            head,
            window_results,
        })
    }
}

async fn read_identity(contract: &dyn MarketplaceContract) -> Result<WorkerIdentity> {
    Ok(WorkerIdentity {
        app_id: contract.worker_app_id().await?,
        worker: contract.worker_address().await?,
    })
}

/// Background read failures are reported as transient
fn transient(err: MarketError) -> MarketError {
    match err {
        MarketError::TransientReadFailure { .. } => err,
        other => MarketError::transient(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256, U256};
    use sentimarket_contract::{BindingStatus, SimulatedChain, SimulatedConnector};
    use sentimarket_types::ErrorKind;
    use sentimarket_wallet::{SimulatedWalletProvider, WalletProvider, WalletSession};
    use std::time::Duration;

    const CHAIN: u64 = 23295;
    const POLL: Duration = Duration::from_secs(30);

    struct Fixture {
        chain: Arc<SimulatedChain>,
        wallet: WalletSession,
        contract: ContractSession,
    }

    fn fixture() -> Fixture {
        let chain = Arc::new(SimulatedChain::new(Address::repeat_byte(0xcc), CHAIN));
        let provider: Arc<dyn WalletProvider> = Arc::new(SimulatedWalletProvider::new(
            vec![Address::repeat_byte(0xa1)],
            CHAIN,
        ));
        let wallet = WalletSession::new(Some(provider));
        let contract = ContractSession::attach(
            wallet.clone(),
            Arc::new(SimulatedConnector::new(chain.clone())),
            chain.address(),
        );
        Fixture {
            chain,
            wallet,
            contract,
        }
    }

    fn config() -> LivenessConfig {
        LivenessConfig::default()
            .with_poll_interval(POLL)
            .with_scan_window(50)
    }

    async fn bound(fx: &Fixture) {
        fx.wallet.connect().await.unwrap();
        fx.contract
            .subscribe()
            .wait_for(|view| view.state.status == BindingStatus::Ready)
            .await
            .unwrap();
    }

    async fn wait_refresh(monitor: &LivenessMonitor, seq: u64) -> LivenessSnapshot {
        monitor
            .subscribe()
            .wait_for(|s| s.refresh_seq >= seq)
            .await
            .unwrap()
            .clone()
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_window_reports_offline() {
        let fx = fixture();
        fx.chain.emit_result(1, "positive", 80);
        fx.chain.mine(60);
        let monitor = LivenessMonitor::attach(&fx.contract, config());
        bound(&fx).await;

        let snapshot = wait_refresh(&monitor, 1).await;
        assert!(!snapshot.is_online);
        assert!(snapshot.last_activity_at.is_none());
        assert_eq!(snapshot.scanned_to_block, Some(fx.chain.block_number()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recent_event_reports_online_with_block_time() {
        let fx = fixture();
        let result = fx.chain.emit_result(1, "positive", 80);
        fx.chain.mine(20);
        let monitor = LivenessMonitor::attach(&fx.contract, config());
        bound(&fx).await;

        let snapshot = wait_refresh(&monitor, 1).await;
        assert!(snapshot.is_online);
        assert_eq!(snapshot.last_activity_at, Some(result.observed_at));
        assert_eq!(snapshot.processed_count, fx.chain.request_count());
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_event_marks_online_between_polls() {
        let fx = fixture();
        let monitor = LivenessMonitor::attach(&fx.contract, config());
        bound(&fx).await;
        assert!(!wait_refresh(&monitor, 1).await.is_online);

        let before = Utc::now();
        fx.chain.emit_result(5, "negative", 70);
        let snapshot = monitor
            .subscribe()
            .wait_for(|s| s.processed_count == 1)
            .await
            .unwrap()
            .clone();
        assert!(snapshot.is_online);
        assert!(snapshot.last_activity_at.is_some_and(|at| at >= before));
        // no poll happened in between
        assert_eq!(snapshot.refresh_seq, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_registration_refreshes_before_next_tick() {
        let fx = fixture();
        let monitor = LivenessMonitor::attach(&fx.contract, config());
        bound(&fx).await;
        let first = wait_refresh(&monitor, 1).await;
        assert!(!first.worker_enabled);

        let start = tokio::time::Instant::now();
        let worker = Address::repeat_byte(0x77);
        fx.chain.register_worker(B256::repeat_byte(0xab), worker);

        let snapshot = wait_refresh(&monitor, 2).await;
        assert!(start.elapsed() < POLL);
        assert!(snapshot.worker_enabled);
        assert_eq!(snapshot.worker_address, Some(worker));
        assert_eq!(snapshot.app_id, Some(B256::repeat_byte(0xab)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_decays_online_belief() {
        let fx = fixture();
        fx.chain.seed_agent(
            Address::repeat_byte(0x01),
            "https://example.com/models/m",
            U256::from(1u64),
        );
        let monitor = LivenessMonitor::attach(&fx.contract, config());
        bound(&fx).await;
        assert_eq!(wait_refresh(&monitor, 1).await.processed_count, 0);

        fx.chain.emit_result(5, "positive", 99);
        monitor
            .subscribe()
            .wait_for(|s| s.is_online && s.processed_count == 1)
            .await
            .unwrap();

        for text in ["first", "second"] {
            fx.contract
                .request_sentiment(0, text, "0.000000000000000001")
                .await
                .unwrap();
        }
        fx.chain.mine(100);
        tokio::time::advance(POLL).await;
        let snapshot = wait_refresh(&monitor, 2).await;
        assert!(!snapshot.is_online);
        // the poll re-reads the chain's total
        assert_eq!(snapshot.processed_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identity_failure_still_publishes_stats() {
        let fx = fixture();
        fx.chain.register_worker(B256::repeat_byte(0xab), Address::repeat_byte(0x77));
        fx.chain.set_fail_identity_reads(true);
        fx.chain.emit_result(1, "positive", 80);
        let monitor = LivenessMonitor::attach(&fx.contract, config());
        bound(&fx).await;

        let snapshot = wait_refresh(&monitor, 1).await;
        assert!(snapshot.worker_enabled);
        assert!(snapshot.is_online);
        assert!(snapshot.worker_address.is_none());
        assert_eq!(
            snapshot.last_error.map(|e| e.kind),
            Some(ErrorKind::TransientReadFailure)
        );

        fx.chain.set_fail_identity_reads(false);
        monitor.refresh_now();
        let recovered = wait_refresh(&monitor, 2).await;
        assert_eq!(recovered.worker_address, Some(Address::repeat_byte(0x77)));
        assert!(recovered.last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_request_before_binding_is_dropped() {
        let fx = fixture();
        let monitor = LivenessMonitor::attach(&fx.contract, config());
        monitor.refresh_now();
        bound(&fx).await;
        wait_refresh(&monitor, 1).await;

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(monitor.snapshot().refresh_seq, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_failure_keeps_known_fields() {
        let fx = fixture();
        fx.chain.seed_agent(
            Address::repeat_byte(0x01),
            "https://example.com/models/m",
            U256::from(1u64),
        );
        let monitor = LivenessMonitor::attach(&fx.contract, config());
        bound(&fx).await;
        let good = wait_refresh(&monitor, 1).await;
        assert_eq!(good.platform_stats.agent_count, 1);

        fx.chain.set_fail_reads(true);
        monitor.refresh_now();
        let failed = wait_refresh(&monitor, 2).await;
        assert_eq!(failed.platform_stats, good.platform_stats);
        assert_eq!(
            failed.last_error.map(|e| e.kind),
            Some(ErrorKind::TransientReadFailure)
        );

        fx.chain.set_fail_reads(false);
        monitor.refresh_now();
        assert!(wait_refresh(&monitor, 3).await.last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_resets_snapshot() {
        let fx = fixture();
        let monitor = LivenessMonitor::attach(&fx.contract, config());
        bound(&fx).await;
        wait_refresh(&monitor, 1).await;

        fx.wallet.disconnect();
        let snapshot = monitor
            .subscribe()
            .wait_for(|s| s.refresh_seq == 0)
            .await
            .unwrap()
            .clone();
        assert_eq!(snapshot, LivenessSnapshot::default());
    }
}
