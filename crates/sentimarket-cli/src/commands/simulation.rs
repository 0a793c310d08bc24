//! In-memory marketplace for `--simulate`
//!
//! Seeds a chain with a few agents and plays the off-chain worker locally:
//! requests are classified with the offline lexicon backend and the result
//! is written back as a contract event.

use crate::config::AppConfig;
use alloy_primitives::{Address, B256, U256};
use sentimarket_contract::SimulatedChain;
use sentimarket_inference::{catalog, LexiconProvider, SentimentAnalysisService};
use sentimarket_types::{parse_native, AgentId, SentimentResult};
use sentimarket_wallet::SimulatedWalletProvider;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

const DEFAULT_CONTRACT: Address = Address::repeat_byte(0x5e);
const DEFAULT_ACCOUNT: Address = Address::repeat_byte(0xa1);
const WORKER: Address = Address::repeat_byte(0x77);

const SAMPLE_TEXTS: &[&str] = &[
    "great product, works perfectly",
    "terrible support and a broken update",
    "the package arrived on tuesday",
    "love the new dashboard, excellent work",
    "disappointed, the app keeps crashing",
];

pub struct SimulatedMarket {
    pub provider: Arc<SimulatedWalletProvider>,
    pub chain: Arc<SimulatedChain>,
    worker: SentimentAnalysisService,
}

impl SimulatedMarket {
    /// A chain on the configured network with three catalog agents and a registered worker
    pub fn seeded(config: &AppConfig) -> anyhow::Result<Self> {
        let account = config.account.unwrap_or(DEFAULT_ACCOUNT);
        let address = config.contract_address.unwrap_or(DEFAULT_CONTRACT);
        let chain_id = config.network.chain_id;

        let provider = Arc::new(SimulatedWalletProvider::new(vec![account], chain_id));
        let chain = Arc::new(SimulatedChain::new(address, chain_id));

        let models = catalog::default_models();
        for (i, price) in ["0.1", "0.2", "0.3"].iter().enumerate() {
            let Some(model) = models.get(i) else { break };
            chain.seed_agent(
                Address::repeat_byte(0x10 + i as u8),
                &format!("{}/{}", config.inference.base_url, model.model_id),
                parse_native(price)?,
            );
        }
        chain.register_worker(B256::repeat_byte(0x5e), WORKER);

        Ok(Self {
            provider,
            chain,
            worker: SentimentAnalysisService::new(Arc::new(LexiconProvider::new())),
        })
    }

    /// Answer the most recent request to `agent_id` the way the worker would
    pub async fn respond(&self, agent_id: AgentId, text: &str) -> Option<SentimentResult> {
        let request_id = self.chain.request_count().checked_sub(1)?;
        let agent = self.chain.agents().into_iter().find(|a| a.id == agent_id)?;
        let analysed = self
            .worker
            .analyze_with_agent(&agent, text, U256::from(request_id))
            .await;
        Some(
            self.chain
                .emit_result(request_id, analysed.sentiment.as_str(), analysed.confidence),
        )
    }

    /// Emit a worker result for a sample text every `every`
    pub fn spawn_traffic(&self, every: Duration) -> JoinHandle<()> {
        let chain = Arc::clone(&self.chain);
        let worker = self.worker.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            for (i, text) in SAMPLE_TEXTS.iter().cycle().enumerate() {
                ticker.tick().await;
                let Some(agent) = chain.agents().into_iter().next() else {
                    continue;
                };
                let request_id = 1_000 + i as u64;
                let analysed = worker
                    .analyze_with_agent(&agent, text, U256::from(request_id))
                    .await;
                chain.emit_result(request_id, analysed.sentiment.as_str(), analysed.confidence);
                debug!(request_id, "Simulated worker result emitted");
            }
        })
    }
}
