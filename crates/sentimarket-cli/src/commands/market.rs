//! Marketplace commands - status, agents, register, request, diagnose, network

use crate::commands::simulation::SimulatedMarket;
use crate::config::AppConfig;
use crate::display;
use anyhow::Context;
use colored::*;
use sentimarket_contract::BindingStatus;
use sentimarket_state::{MarketplaceSession, SessionConfig, SessionEvent};
use sentimarket_types::{format_native, AgentId, NetworkConfig};
use std::time::Duration;
use tracing::debug;

/// A session plus the simulated market behind it, when simulating
pub struct Opened {
    pub session: MarketplaceSession,
    pub sim: Option<SimulatedMarket>,
}

/// Build the session stack without connecting
pub fn build(config: &AppConfig) -> anyhow::Result<Opened> {
    if config.simulate {
        let sim = SimulatedMarket::seeded(config)?;
        let session = MarketplaceSession::simulated(
            sim.provider.clone(),
            sim.chain.clone(),
            config.liveness.clone(),
        );
        return Ok(Opened {
            session,
            sim: Some(sim),
        });
    }

    let session_config =
        SessionConfig::new(config.require_contract()?).with_liveness(config.liveness.clone());
    let session = MarketplaceSession::over_rpc(&config.rpc, config.account, session_config);
    Ok(Opened { session, sim: None })
}

/// Build, connect and wait for the binding to settle.
///
/// With `require_ready` a failed binding is returned as an error.
pub async fn open(config: &AppConfig, require_ready: bool) -> anyhow::Result<Opened> {
    let opened = build(config)?;
    let view = opened
        .session
        .connect()
        .await
        .context("wallet connection failed")?;

    if let Some((_, chain_id)) = opened.session.wallet().state().connection() {
        if chain_id != config.network.chain_id && !config.json {
            display::warning(&format!(
                "Wallet is on chain {chain_id}, expected {} ({}); try `sentimarket switch-network`",
                config.network.chain_id, config.network.chain_name
            ));
        }
    }

    if require_ready && view.state.status != BindingStatus::Ready {
        let reason = view
            .state
            .last_error
            .map(|e| e.message)
            .unwrap_or_else(|| "binding did not complete".to_string());
        anyhow::bail!("contract not usable: {reason} (run `sentimarket diagnose` for details)");
    }
    Ok(opened)
}

pub async fn status(config: &AppConfig) -> anyhow::Result<()> {
    let opened = open(config, false).await?;
    let session = &opened.session;

    if session.contract().state().is_ready() {
        // give the monitor its first refresh
        let mut snapshots = session.liveness().subscribe();
        let settled =
            tokio::time::timeout(Duration::from_secs(10), snapshots.wait_for(|s| s.refresh_seq >= 1))
                .await;
        if settled.is_err() {
            debug!("Liveness refresh did not complete in time");
        }
    }

    let status = session.status();
    if config.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        display::section("Session");
        display::labeled("Network", &config.network.chain_name);
        display::wallet(&status.wallet);
        display::contract(&status.contract, status.binding_id);
        display::section("Worker");
        display::liveness(&status.liveness);
    }
    session.shutdown();
    Ok(())
}

pub async fn agents(config: &AppConfig) -> anyhow::Result<()> {
    let opened = open(config, true).await?;
    let agents = opened.session.contract().enumerate_agents().await?;
    if config.json {
        println!("{}", serde_json::to_string_pretty(&agents)?);
    } else {
        display::section(&format!("Agents ({})", agents.len()));
        display::agents(&agents);
    }
    opened.session.shutdown();
    Ok(())
}

pub async fn register(config: &AppConfig, endpoint: &str, price: &str) -> anyhow::Result<()> {
    let opened = open(config, true).await?;
    let pb = (!config.json).then(|| display::spinner("Registering agent..."));
    let outcome = opened.session.contract().register_agent(endpoint, price).await;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    let tx_hash = outcome?;

    if config.json {
        println!("{}", serde_json::json!({ "tx_hash": tx_hash, "endpoint": endpoint, "price": price }));
    } else {
        display::success(&format!("Agent registered at {} per request", price.bright_cyan()));
        display::labeled("Transaction", &format!("{tx_hash:#x}"));
    }
    opened.session.shutdown();
    Ok(())
}

pub async fn request(
    config: &AppConfig,
    agent_id: AgentId,
    text: &str,
    payment: Option<&str>,
    wait: Duration,
) -> anyhow::Result<()> {
    let opened = open(config, true).await?;
    let contract = opened.session.contract();

    let payment = match payment {
        Some(payment) => payment.to_string(),
        None => {
            let agents = contract.enumerate_agents().await?;
            let agent = agents
                .iter()
                .find(|a| a.id == agent_id)
                .with_context(|| format!("agent #{agent_id} does not exist"))?;
            format_native(agent.price)
        }
    };

    let mut events = opened.session.subscribe();
    let pb = (!config.json).then(|| display::spinner("Submitting request..."));
    let outcome = contract.request_sentiment(agent_id, text, &payment).await;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    let tx_hash = outcome?;
    if !config.json {
        display::success(&format!("Request sent to agent #{agent_id}, paid {payment}"));
        display::labeled("Transaction", &format!("{tx_hash:#x}"));
    }

    if let Some(sim) = &opened.sim {
        sim.respond(agent_id, text).await;
    }

    let wait = if opened.sim.is_some() && wait.is_zero() {
        Duration::from_secs(5)
    } else {
        wait
    };
    if !wait.is_zero() {
        let received = tokio::time::timeout(wait, async {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::ResultReceived { result, .. }) => return Some(result),
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .await
        .ok()
        .flatten();

        match (received, config.json) {
            (Some(result), true) => println!("{}", serde_json::to_string(&result)?),
            (Some(result), false) => display::result(&result),
            (None, true) => println!("{}", serde_json::json!({ "tx_hash": tx_hash })),
            (None, false) => display::info("No result yet; follow with `sentimarket watch`"),
        }
    } else if config.json {
        println!("{}", serde_json::json!({ "tx_hash": tx_hash }));
    }

    opened.session.shutdown();
    Ok(())
}

pub async fn diagnose(config: &AppConfig) -> anyhow::Result<()> {
    let opened = open(config, false).await?;
    let report = opened.session.contract().diagnose().await?;
    if config.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        display::section("Contract diagnostics");
        display::diagnostics(&report);
    }
    opened.session.shutdown();
    Ok(())
}

pub async fn switch_network(config: &AppConfig, name: &str) -> anyhow::Result<()> {
    let network = NetworkConfig::from_name(name)?;
    let opened = build(config)?;
    let wallet = opened.session.wallet();
    wallet.connect().await.context("wallet connection failed")?;

    wallet.switch_network(&network).await;
    // an accepted switch arrives as a chain-changed notification
    let mut views = wallet.subscribe();
    let switched = tokio::time::timeout(
        Duration::from_secs(10),
        views.wait_for(|view| view.state.chain_id == Some(network.chain_id)),
    )
    .await
    .is_ok();

    if config.json {
        println!(
            "{}",
            serde_json::json!({ "requested": network.chain_id, "switched": switched, "wallet": wallet.state() })
        );
    } else if switched {
        display::success(&format!("Wallet switched to {} ({})", network.chain_name, network.chain_id));
    } else {
        display::warning(&format!(
            "Wallet did not switch to {}; the request may have been declined",
            network.chain_name
        ));
    }
    opened.session.shutdown();
    Ok(())
}
