//! End-to-end scenarios over the simulated wallet and chain

use sentimarket_contract::{BindingStatus, SimulatedChain};
use sentimarket_liveness::LivenessConfig;
use sentimarket_state::{MarketplaceSession, SessionEvent};
use sentimarket_types::{parse_native, Address, ErrorKind, MarketError, U256};
use sentimarket_wallet::{ConnectionStatus, SimulatedWalletProvider, WalletSessionState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const SAPPHIRE_TESTNET: u64 = 23295;
const POLL: Duration = Duration::from_secs(30);

fn alice() -> Address {
    Address::repeat_byte(0xa1)
}

struct Harness {
    provider: Arc<SimulatedWalletProvider>,
    chain: Arc<SimulatedChain>,
    session: MarketplaceSession,
}

fn harness(agent_prices: &[&str]) -> Harness {
    let provider = Arc::new(SimulatedWalletProvider::new(vec![alice()], SAPPHIRE_TESTNET));
    let chain = Arc::new(SimulatedChain::new(
        Address::repeat_byte(0xcc),
        SAPPHIRE_TESTNET,
    ));
    for (i, price) in agent_prices.iter().enumerate() {
        chain.seed_agent(
            Address::repeat_byte(0x10 + i as u8),
            &format!("https://api-inference.huggingface.co/models/model-{i}"),
            parse_native(price).unwrap(),
        );
    }
    let liveness = LivenessConfig::default()
        .with_poll_interval(POLL)
        .with_scan_window(50);
    let session = MarketplaceSession::simulated(provider.clone(), chain.clone(), liveness);
    Harness {
        provider,
        chain,
        session,
    }
}

/// Receive until `pred` matches, failing after a generous timeout
async fn next_matching<F>(events: &mut broadcast::Receiver<SessionEvent>, pred: F) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(300), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

fn assert_wallet_invariant(state: &WalletSessionState) {
    let connected = state.status == ConnectionStatus::Connected;
    assert_eq!(state.account.is_some(), connected, "{state:?}");
    assert_eq!(state.chain_id.is_some(), connected, "{state:?}");
}

#[tokio::test]
async fn test_underpaid_request_reverts_and_leaves_agents_unchanged() {
    let h = harness(&["0.1", "0.2", "0.3"]);

    let view = h.session.connect().await.unwrap();
    assert_eq!(view.state.status, BindingStatus::Ready);
    assert_eq!(h.session.wallet().state().chain_id, Some(SAPPHIRE_TESTNET));

    let agents = h.session.contract().enumerate_agents().await.unwrap();
    let ids: Vec<_> = agents.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    assert_eq!(agents[1].price_display(), "0.2");

    let err = h
        .session
        .contract()
        .request_sentiment(1, "great product", "0.1")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CallReverted);
    assert!(err.is_insufficient_payment());

    let after = h.session.contract().enumerate_agents().await.unwrap();
    assert_eq!(after, agents);
    assert_eq!(h.chain.request_count(), 0);

    // the exact price goes through
    h.session
        .contract()
        .request_sentiment(1, "great product", "0.2")
        .await
        .unwrap();
    assert_eq!(h.chain.request_count(), 1);
}

#[tokio::test]
async fn test_register_after_disconnect_is_not_ready() {
    let h = harness(&["0.1"]);
    h.session.connect().await.unwrap();

    h.session.wallet().disconnect();
    let err = h
        .session
        .contract()
        .register_agent("https://api-inference.huggingface.co/models/distilbert", "0.5")
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::ContractNotReady));
    assert_eq!(h.chain.agents().len(), 1);
}

#[tokio::test]
async fn test_reconnect_returns_the_fresh_binding() {
    let h = harness(&["0.1"]);
    let first = h.session.connect().await.unwrap();
    assert_eq!(first.binding_id, 1);

    h.session.wallet().disconnect();
    let second = h.session.connect().await.unwrap();
    assert_eq!(second.state.status, BindingStatus::Ready);
    assert_eq!(second.binding_id, 2);
    assert_eq!(second.wallet_generation, h.session.wallet().view().generation);
    assert_eq!(
        second.contract.as_ref().map(|c| c.wallet_generation),
        Some(second.wallet_generation)
    );

    // usable straight away, no stale handle in between
    let agents = h.session.contract().enumerate_agents().await.unwrap();
    assert_eq!(agents.len(), 1);
}

#[tokio::test]
async fn test_reconnect_after_failed_binding_waits_for_the_new_bind() {
    let h = harness(&["0.1"]);
    h.chain.set_fail_reads(true);
    let failed = h.session.connect().await.unwrap();
    assert_eq!(failed.state.status, BindingStatus::Error);

    h.chain.set_fail_reads(false);
    h.session.wallet().disconnect();
    let view = h.session.connect().await.unwrap();
    assert_eq!(view.state.status, BindingStatus::Ready);
    assert!(view.wallet_generation > failed.wallet_generation);
    assert!(h.session.contract().enumerate_agents().await.is_ok());
}

#[tokio::test]
async fn test_disconnect_unbinds_within_one_cycle() {
    let h = harness(&[]);
    h.session.connect().await.unwrap();
    assert!(h.session.contract().state().is_ready());

    h.session.wallet().disconnect();
    let mut views = h.session.contract().subscribe();
    let view = tokio::time::timeout(
        Duration::from_secs(1),
        views.wait_for(|view| view.state.status == BindingStatus::Idle),
    )
    .await
    .expect("contract still bound after disconnect")
    .unwrap()
    .clone();
    assert!(view.contract.is_none());
}

#[tokio::test]
async fn test_wallet_invariant_over_connect_disconnect_sequences() {
    let h = harness(&[]);
    let mut events = h.session.subscribe();

    for round in 0..3 {
        h.session.wallet().connect().await.unwrap();
        // connecting twice is a no-op
        h.session.wallet().connect().await.unwrap();
        assert_wallet_invariant(&h.session.wallet().state());

        if round % 2 == 0 {
            h.session.wallet().disconnect();
        } else {
            h.provider.set_accounts(vec![]);
            h.session
                .wallet()
                .subscribe()
                .wait_for(|view| view.state.status == ConnectionStatus::Disconnected)
                .await
                .unwrap();
            h.provider.set_accounts(vec![alice()]);
        }
        assert_wallet_invariant(&h.session.wallet().state());
    }

    h.provider.set_accounts(vec![]);
    let err = h.session.wallet().connect().await.unwrap_err();
    assert!(matches!(err, MarketError::NoAccountsAuthorized));
    assert_eq!(h.session.wallet().state().status, ConnectionStatus::Error);

    let mut seen = 0;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::WalletChanged { state, .. } = event {
            assert_wallet_invariant(&state);
            seen += 1;
        }
    }
    assert!(seen > 0);
}

#[tokio::test]
async fn test_failed_probe_never_reports_ready() {
    let h = harness(&["0.1"]);
    let mut events = h.session.subscribe();
    h.chain.set_fail_reads(true);

    let view = h.session.connect().await.unwrap();
    assert_eq!(view.state.status, BindingStatus::Error);
    assert_eq!(
        view.state.last_error.as_ref().map(|e| e.kind),
        Some(ErrorKind::BindingFailed)
    );
    assert!(view.contract.is_none());
    assert!(h.chain.read_count() >= 1);

    while let Ok(event) = events.try_recv() {
        if let SessionEvent::ContractChanged { state, .. } = event {
            assert_ne!(state.status, BindingStatus::Ready);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_results_reach_the_bus_and_mark_worker_online() {
    let h = harness(&["0.1"]);
    let mut events = h.session.subscribe();
    h.session.connect().await.unwrap();

    // the results subscription is in place once Ready has been re-published
    next_matching(&mut events, |e| {
        matches!(e, SessionEvent::ContractChanged { state, .. } if state.is_ready())
    })
    .await;
    let first = next_matching(&mut events, |e| {
        matches!(e, SessionEvent::LivenessUpdated { snapshot, .. } if snapshot.refresh_seq >= 1)
    })
    .await;
    let SessionEvent::LivenessUpdated { snapshot, .. } = first else {
        unreachable!()
    };
    assert!(!snapshot.is_online);

    h.chain.emit_result(0, "POSITIVE", 91);

    let received = next_matching(&mut events, |e| matches!(e, SessionEvent::ResultReceived { .. })).await;
    let SessionEvent::ResultReceived { result, .. } = received else {
        unreachable!()
    };
    assert_eq!(result.request_id, U256::ZERO);
    assert_eq!(result.confidence, 91);

    next_matching(&mut events, |e| {
        matches!(e, SessionEvent::LivenessUpdated { snapshot, .. } if snapshot.is_online)
    })
    .await;
    let snapshot = h.session.liveness().snapshot();
    assert_eq!(snapshot.processed_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_worker_registration_refreshes_before_next_tick() {
    let h = harness(&[]);
    h.session.connect().await.unwrap();
    let mut snapshots = h.session.liveness().subscribe();
    snapshots.wait_for(|s| s.refresh_seq >= 1).await.unwrap();
    let started = tokio::time::Instant::now();

    h.chain
        .register_worker(sentimarket_types::B256::repeat_byte(0xab), Address::repeat_byte(0x77));

    let snapshot = snapshots
        .wait_for(|s| s.worker_address.is_some())
        .await
        .unwrap()
        .clone();
    assert!(started.elapsed() < POLL);
    assert!(snapshot.worker_enabled);
    assert_eq!(snapshot.refresh_seq, 2);
}

#[tokio::test]
async fn test_shutdown_stops_following_the_wallet() {
    let h = harness(&[]);
    h.session.connect().await.unwrap();
    let mut events = h.session.subscribe();

    h.session.shutdown();
    next_matching(&mut events, |e| matches!(e, SessionEvent::SessionStopped { .. })).await;

    assert!(!h.session.wallet().state().is_connected());
    assert_eq!(h.session.contract().state().status, BindingStatus::Idle);
    assert_eq!(h.session.liveness().snapshot().refresh_seq, 0);
}
