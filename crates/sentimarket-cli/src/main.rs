//! SentiMarket CLI - Pay-per-request sentiment analysis agents
//!
//! Connects a signing account, binds the marketplace contract and drives it:
//! list and register agents, pay for sentiment requests, and follow worker
//! results and liveness as they happen.
//!
//! # Quick Start
//!
//! ```bash
//! # Everything in memory, no chain or wallet needed
//! sentimarket --simulate agents
//! sentimarket --simulate request 1 "great product"
//! sentimarket --simulate watch --duration 20
//!
//! # Against a node that manages accounts
//! export SENTIMARKET_RPC_URL=http://localhost:8545
//! export SENTIMARKET_CONTRACT_ADDRESS=0x...
//! sentimarket status
//! ```

use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod display;

use commands::{analyze, market, watch};
use config::{AppConfig, GlobalArgs, LoggingConfig};

/// SentiMarket CLI - Sentiment analysis agents on Oasis Sapphire
#[derive(Parser)]
#[command(name = "sentimarket")]
#[command(author = "SentiMarket Contributors")]
#[command(version)]
#[command(about = "Pay-per-request sentiment analysis agents with an off-chain worker", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show wallet, contract binding and worker liveness
    Status,

    /// List registered agents in on-chain order
    Agents,

    /// Register a new analysis agent
    Register {
        /// Model endpoint, e.g. https://api-inference.huggingface.co/models/<model>
        endpoint: String,

        /// Price per request in native units, e.g. 0.1
        #[arg(short, long)]
        price: String,
    },

    /// Pay an agent to analyse a text
    Request {
        /// Agent id
        agent_id: u64,

        /// Text to analyse
        text: String,

        /// Payment in native units (defaults to the agent's price)
        #[arg(short, long)]
        payment: Option<String>,

        /// Seconds to wait for the worker's result
        #[arg(short, long, default_value = "0")]
        wait: u64,
    },

    /// Follow session, result and liveness events
    Watch {
        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,
    },

    /// Check the configured contract address without binding to it
    Diagnose,

    /// Ask the wallet to add and switch to a network preset
    SwitchNetwork {
        /// sapphire-testnet, sapphire-mainnet or localnet
        network: String,
    },

    /// Classify a text locally with a catalog or hub model
    Analyze {
        /// Text to analyse
        text: String,

        /// Catalog key or hub model id
        #[arg(short, long)]
        model: Option<String>,

        /// Use the offline lexicon classifier
        #[arg(long)]
        offline: bool,
    },

    /// List recommended models or validate one
    Models {
        /// Filter by use case: general, social, reviews, emotions, finance
        #[arg(short, long)]
        use_case: Option<String>,

        /// Check that a hub model does text classification
        #[arg(long)]
        validate: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::from_args(&cli.global)?;
    init_logging(&config.logging)?;

    if !config.json {
        display::print_banner();
        if config.simulate {
            display::info("Simulation mode: in-memory wallet and chain");
            println!();
        }
    }

    let outcome = match cli.command {
        Commands::Status => market::status(&config).await,
        Commands::Agents => market::agents(&config).await,
        Commands::Register { endpoint, price } => {
            market::register(&config, &endpoint, &price).await
        }
        Commands::Request {
            agent_id,
            text,
            payment,
            wait,
        } => {
            market::request(
                &config,
                agent_id,
                &text,
                payment.as_deref(),
                Duration::from_secs(wait),
            )
            .await
        }
        Commands::Watch { duration } => {
            watch::run(&config, duration.map(Duration::from_secs)).await
        }
        Commands::Diagnose => market::diagnose(&config).await,
        Commands::SwitchNetwork { network } => market::switch_network(&config, &network).await,
        Commands::Analyze {
            text,
            model,
            offline,
        } => analyze::analyze(&config, &text, model.as_deref(), offline).await,
        Commands::Models { use_case, validate } => {
            analyze::models(&config, use_case.as_deref(), validate.as_deref()).await
        }
    };

    if let Err(err) = &outcome {
        if !config.json {
            display::error(&format!("{err:#}"));
        }
    }
    outcome
}

/// Initialize logging; diagnostics go to stderr so command output stays clean
fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            subscriber
                .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
                .try_init()?;
        }
        _ => {
            subscriber
                .with(fmt::layer().pretty().with_target(true).with_writer(std::io::stderr))
                .try_init()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_request_with_global_flags() {
        let cli = Cli::try_parse_from([
            "sentimarket",
            "request",
            "1",
            "great product",
            "--payment",
            "0.1",
            "--simulate",
        ])
        .unwrap();
        assert!(cli.global.simulate);
        match cli.command {
            Commands::Request {
                agent_id, payment, ..
            } => {
                assert_eq!(agent_id, 1);
                assert_eq!(payment.as_deref(), Some("0.1"));
            }
            _ => panic!("expected request"),
        }
    }
}
