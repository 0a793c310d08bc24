//! Display utilities for the CLI

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use sentimarket_contract::{BindingStatus, ContractDiagnostics, ContractSessionState};
use sentimarket_inference::{AnalysisOutput, TransformerModel};
use sentimarket_liveness::LivenessSnapshot;
use sentimarket_types::{format_native, short_address, Agent, Sentiment, SentimentResult};
use sentimarket_wallet::{ConnectionStatus, WalletSessionState};
use std::time::Duration;

pub fn print_banner() {
    println!();
    println!("{}", "╔══════════════════════════════════════════════════════╗".bright_cyan());
    println!(
        "{}{}{}",
        "║  ".bright_cyan(),
        "SentiMarket".bright_white().bold(),
        " - Sentiment analysis agents on Sapphire   ║".bright_cyan()
    );
    println!("{}", "╚══════════════════════════════════════════════════════╝".bright_cyan());
    println!();
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", "━".repeat(60).bright_black());
    println!(" {}", title.bright_white().bold());
    println!("{}", "━".repeat(60).bright_black());
}

pub fn success(message: &str) {
    println!("  {} {}", "✓".bright_green(), message);
}

pub fn error(message: &str) {
    println!("  {} {}", "✗".bright_red(), message.bright_red());
}

pub fn info(message: &str) {
    println!("  {} {}", "→".bright_blue(), message);
}

pub fn warning(message: &str) {
    println!("  {} {}", "⚠".yellow(), message.yellow());
}

/// Print a labeled value
pub fn labeled(label: &str, value: &str) {
    println!("  {:<18} {}", format!("{label}:").bright_white(), value.bright_cyan());
}

/// Spinner shown while waiting on the chain
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn dot(ok: bool) -> ColoredString {
    if ok {
        "●".bright_green()
    } else {
        "○".bright_red()
    }
}

pub fn wallet(state: &WalletSessionState) {
    let status = match state.status {
        ConnectionStatus::Connected => "connected".bright_green(),
        ConnectionStatus::Connecting => "connecting".yellow(),
        ConnectionStatus::Disconnected => "disconnected".bright_black(),
        ConnectionStatus::Error => "error".bright_red(),
    };
    println!("  {} Wallet: {}", dot(state.is_connected()), status);
    if let Some((account, chain_id)) = state.connection() {
        labeled("Account", &format!("{account:#x}"));
        labeled("Chain", &chain_id.to_string());
    }
    if let Some(err) = &state.last_error {
        labeled("Last error", &err.to_string());
    }
}

pub fn contract(state: &ContractSessionState, binding_id: u64) {
    let status = match state.status {
        BindingStatus::Ready => "ready".bright_green(),
        BindingStatus::Binding => "binding".yellow(),
        BindingStatus::Idle => "idle".bright_black(),
        BindingStatus::Error => "error".bright_red(),
    };
    println!("  {} Contract: {}", dot(state.is_ready()), status);
    if let Some(address) = state.bound_address {
        labeled("Address", &format!("{address:#x}"));
        labeled("Binding", &format!("#{binding_id}"));
    }
    if let Some(err) = &state.last_error {
        labeled("Last error", &err.to_string());
    }
}

pub fn liveness(snapshot: &LivenessSnapshot) {
    let status = if snapshot.is_online {
        "online".bright_green()
    } else {
        "offline".bright_red()
    };
    println!("  {} Worker: {}", dot(snapshot.is_online), status);
    labeled("Enabled", &snapshot.worker_enabled.to_string());
    if let Some(worker) = snapshot.worker_address {
        labeled("Worker address", &short_address(&worker));
    }
    if let Some(app_id) = snapshot.app_id {
        labeled("App id", &format!("{app_id:#x}"));
    }
    match snapshot.last_activity_at {
        Some(at) => labeled("Last activity", &at.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
        None => labeled("Last activity", "none seen"),
    }
    labeled("Processed", &snapshot.processed_count.to_string());

    let stats = &snapshot.platform_stats;
    labeled("Agents", &stats.agent_count.to_string());
    labeled("Requests", &stats.request_count.to_string());
    labeled("Platform fee", &format!("{:.2}%", stats.fee_bps as f64 / 100.0));
    labeled("Fees collected", &format_native(stats.total_fees));
    if let Some(err) = &snapshot.last_error {
        warning(&format!("Last refresh failed: {err}"));
    }
}

pub fn agents(agents: &[Agent]) {
    if agents.is_empty() {
        println!("  {}", "No agents registered yet".yellow());
        return;
    }
    println!(
        "  {:>4}  {:<14} {:>10}  {}",
        "ID".bright_white(),
        "Owner".bright_white(),
        "Price".bright_white(),
        "Model".bright_white()
    );
    for agent in agents {
        let model = if agent.active {
            agent.model_id().normal()
        } else {
            format!("{} (inactive)", agent.model_id()).bright_black()
        };
        println!(
            "  {:>4}  {:<14} {:>10}  {}",
            agent.id,
            short_address(&agent.owner),
            agent.price_display().bright_cyan(),
            model
        );
    }
}

fn sentiment_colored(sentiment: Sentiment) -> ColoredString {
    match sentiment {
        Sentiment::Positive => sentiment.as_str().bright_green(),
        Sentiment::Neutral => sentiment.as_str().bright_white(),
        Sentiment::Negative => sentiment.as_str().bright_red(),
    }
}

pub fn result(result: &SentimentResult) {
    println!(
        "  {} request #{} → {} ({}%)",
        "●".bright_cyan(),
        result.request_id,
        sentiment_colored(result.sentiment),
        result.confidence
    );
}

pub fn analysis(output: &AnalysisOutput, sentiment: Sentiment, confidence: u8) {
    println!(
        "  {} ({}%) via {} in {} ms",
        sentiment_colored(sentiment),
        confidence,
        output.model_used.bright_cyan(),
        output.processing_time_ms
    );
    for prediction in &output.predictions {
        let width = (prediction.score * 30.0).round() as usize;
        println!(
            "    {:<12} {:>6.2}%  {}",
            prediction.label,
            prediction.score * 100.0,
            "█".repeat(width).bright_blue()
        );
    }
}

pub fn models(models: &[TransformerModel]) {
    for model in models {
        println!("  {} {}", "●".bright_cyan(), model.name.bright_white().bold());
        println!("      {}", model.model_id.bright_cyan());
        println!("      {}", model.description.bright_black());
        println!("      labels: {}", model.labels.join(", "));
    }
}

pub fn diagnostics(report: &ContractDiagnostics) {
    labeled("Address", &format!("{:#x}", report.address));
    labeled("Chain", &report.chain_id.to_string());
    labeled("Account", &format!("{:#x}", report.account));
    labeled("Binding", &format!("{:?}", report.binding));
    labeled(
        "Code size",
        &report
            .code_size
            .map(|size| format!("{size} bytes"))
            .unwrap_or_else(|| "unknown".to_string()),
    );
    labeled(
        "Agent count",
        &report
            .agent_count
            .map(|count| count.to_string())
            .unwrap_or_else(|| "unreadable".to_string()),
    );
    labeled("Agent #0 readable", &report.first_agent_readable.to_string());
    println!();
    if report.is_healthy() {
        success("Contract is deployed and readable");
    } else {
        for err in &report.errors {
            error(err);
        }
    }
}
