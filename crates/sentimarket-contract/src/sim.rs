//! In-memory marketplace chain
//!
//! Mirrors the deployed contract's rules (exact payment, active agents,
//! positive prices) closely enough to drive the session layer end to end
//! without a node. Blocks are mined on every write and on demand.

use crate::binding::{ContractConnector, MarketplaceContract, MarketplaceEvent, EVENT_CAPACITY};
use alloy_primitives::{keccak256, Address, B256, U256};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, MutexGuard};
use sentimarket_types::{
    Agent, AgentId, MarketError, PlatformStats, PlatformStatsReading, Result, SentimentResult,
};
use sentimarket_wallet::TransactionSigner;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Seconds between simulated blocks
pub const DEFAULT_BLOCK_TIME_SECS: i64 = 6;

/// Platform fee taken from each request, in percent
pub const DEFAULT_FEE_PERCENT: u64 = 5;

#[derive(Debug)]
struct ChainState {
    block: u64,
    genesis: DateTime<Utc>,
    block_time: Duration,
    agents: Vec<Agent>,
    request_count: u64,
    fee_percent: u64,
    total_fees: U256,
    worker_enabled: bool,
    app_id: B256,
    worker: Address,
    results: Vec<SentimentResult>,
    tx_count: u64,
    fail_reads: bool,
    fail_identity_reads: bool,
    /// What `agent_count` reports instead of the table length
    reported_agent_count: Option<u64>,
    reads: u64,
}

impl ChainState {
    fn timestamp(&self, block: u64) -> DateTime<Utc> {
        self.genesis + self.block_time * block as i32
    }

    fn mine(&mut self) -> u64 {
        self.block += 1;
        self.block
    }

    fn tx_hash(&mut self, from: Address) -> B256 {
        self.tx_count += 1;
        let mut preimage = from.to_vec();
        preimage.extend_from_slice(&self.tx_count.to_be_bytes());
        keccak256(preimage)
    }
}

/// A marketplace contract deployed at one address on one chain
pub struct SimulatedChain {
    address: Address,
    chain_id: u64,
    state: Mutex<ChainState>,
    events: broadcast::Sender<MarketplaceEvent>,
    hold: watch::Sender<bool>,
}

impl SimulatedChain {
    pub fn new(address: Address, chain_id: u64) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            address,
            chain_id,
            state: Mutex::new(ChainState {
                block: 0,
                genesis: Utc::now(),
                block_time: Duration::seconds(DEFAULT_BLOCK_TIME_SECS),
                agents: Vec::new(),
                request_count: 0,
                fee_percent: DEFAULT_FEE_PERCENT,
                total_fees: U256::ZERO,
                worker_enabled: false,
                app_id: B256::ZERO,
                worker: Address::ZERO,
                results: Vec::new(),
                tx_count: 0,
                fail_reads: false,
                fail_identity_reads: false,
                reported_agent_count: None,
                reads: 0,
            }),
            events,
            hold: watch::channel(false).0,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn block_number(&self) -> u64 {
        self.state.lock().block
    }

    /// Timestamp of a block
    pub fn block_timestamp(&self, block: u64) -> DateTime<Utc> {
        self.state.lock().timestamp(block)
    }

    /// Mine empty blocks, returning the new head
    pub fn mine(&self, blocks: u64) -> u64 {
        let mut state = self.state.lock();
        state.block += blocks;
        state.block
    }

    /// Register an agent directly, bypassing any signer
    pub fn seed_agent(&self, owner: Address, model_endpoint: &str, price: U256) -> AgentId {
        let mut state = self.state.lock();
        let id = state.agents.len() as AgentId;
        state.agents.push(Agent {
            id,
            owner,
            model_endpoint: model_endpoint.to_string(),
            price,
            active: true,
        });
        state.mine();
        id
    }

    pub fn set_agent_active(&self, id: AgentId, active: bool) {
        if let Some(agent) = self.state.lock().agents.get_mut(id as usize) {
            agent.active = active;
        }
    }

    /// Current agent table
    pub fn agents(&self) -> Vec<Agent> {
        self.state.lock().agents.clone()
    }

    /// Write a worker result in a new block and push it to subscribers
    pub fn emit_result(&self, request_id: u64, label: &str, confidence: u8) -> SentimentResult {
        let result = {
            let mut state = self.state.lock();
            let block = state.mine();
            let result = SentimentResult::from_raw(
                U256::from(request_id),
                label,
                U256::from(confidence),
                state.timestamp(block),
            )
            .with_block(block)
            .with_worker(state.worker);
            state.results.push(result.clone());
            result
        };
        let _ = self
            .events
            .send(MarketplaceEvent::SentimentResult(result.clone()));
        result
    }

    /// Register the off-chain worker identity and enable it
    pub fn register_worker(&self, app_id: B256, worker: Address) {
        {
            let mut state = self.state.lock();
            state.app_id = app_id;
            state.worker = worker;
            state.worker_enabled = true;
            state.mine();
        }
        let _ = self
            .events
            .send(MarketplaceEvent::WorkerRegistered { app_id, worker });
    }

    /// Make every read fail until cleared
    pub fn set_fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    /// Make only the worker identity reads (`app id`, `worker address`) fail
    pub fn set_fail_identity_reads(&self, fail: bool) {
        self.state.lock().fail_identity_reads = fail;
    }

    /// Report `count` from `agent_count` regardless of the agent table, as a
    /// contract with a mismatched ABI would
    pub fn misreport_agent_count(&self, count: Option<u64>) {
        self.state.lock().reported_agent_count = count;
    }

    /// Number of read calls served so far
    pub fn read_count(&self) -> u64 {
        self.state.lock().reads
    }

    pub fn request_count(&self) -> u64 {
        self.state.lock().request_count
    }

    /// Park incoming transactions until [`release_writes`](Self::release_writes)
    pub fn hold_writes(&self) {
        self.hold.send_replace(true);
    }

    pub fn release_writes(&self) {
        self.hold.send_replace(false);
    }

    async fn writable(&self) {
        let mut rx = self.hold.subscribe();
        let _ = rx.wait_for(|held| !*held).await;
    }
}

/// Builds [`SimulatedMarketplace`] handles against one chain
pub struct SimulatedConnector {
    chain: Arc<SimulatedChain>,
}

impl SimulatedConnector {
    pub fn new(chain: Arc<SimulatedChain>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl ContractConnector for SimulatedConnector {
    async fn connect(
        &self,
        address: Address,
        signer: Arc<dyn TransactionSigner>,
        chain_id: u64,
    ) -> Result<Arc<dyn MarketplaceContract>> {
        Ok(Arc::new(SimulatedMarketplace {
            chain: Arc::clone(&self.chain),
            address,
            chain_id,
            from: signer.address(),
        }))
    }
}

/// Contract handle over a [`SimulatedChain`]
pub struct SimulatedMarketplace {
    chain: Arc<SimulatedChain>,
    address: Address,
    chain_id: u64,
    from: Address,
}

impl SimulatedMarketplace {
    fn deployed(&self) -> bool {
        self.address == self.chain.address && self.chain_id == self.chain.chain_id
    }

    /// Lock chain state for a read, applying deployment and failure rules
    fn read(&self) -> Result<MutexGuard<'_, ChainState>> {
        if !self.deployed() {
            return Err(MarketError::rpc(
                "eth_call",
                format!("no contract code at {} on chain {}", self.address, self.chain_id),
            ));
        }
        let mut state = self.chain.state.lock();
        state.reads += 1;
        if state.fail_reads {
            return Err(MarketError::transient("simulated read failure"));
        }
        Ok(state)
    }

    fn read_identity(&self) -> Result<MutexGuard<'_, ChainState>> {
        let state = self.read()?;
        if state.fail_identity_reads {
            return Err(MarketError::transient("simulated worker identity read failure"));
        }
        Ok(state)
    }

    async fn write(&self) -> Result<MutexGuard<'_, ChainState>> {
        self.chain.writable().await;
        if !self.deployed() {
            return Err(MarketError::rpc(
                "eth_sendTransaction",
                format!("no contract code at {}", self.address),
            ));
        }
        Ok(self.chain.state.lock())
    }
}

#[async_trait]
impl MarketplaceContract for SimulatedMarketplace {
    fn address(&self) -> Address {
        self.address
    }

    async fn agent_count(&self) -> Result<u64> {
        let state = self.read()?;
        Ok(state
            .reported_agent_count
            .unwrap_or(state.agents.len() as u64))
    }

    async fn agent(&self, index: AgentId) -> Result<Agent> {
        self.read()?
            .agents
            .get(index as usize)
            .cloned()
            .ok_or_else(|| MarketError::reverted("Agent does not exist"))
    }

    async fn platform_stats(&self) -> Result<PlatformStatsReading> {
        let state = self.read()?;
        Ok(PlatformStatsReading {
            stats: PlatformStats {
                agent_count: state.agents.len() as u64,
                request_count: state.request_count,
                fee_bps: state.fee_percent * 100,
                total_fees: state.total_fees,
            },
            worker_enabled: state.worker_enabled,
        })
    }

    async fn worker_app_id(&self) -> Result<B256> {
        Ok(self.read_identity()?.app_id)
    }

    async fn worker_address(&self) -> Result<Address> {
        Ok(self.read_identity()?.worker)
    }

    async fn worker_enabled(&self) -> Result<bool> {
        Ok(self.read()?.worker_enabled)
    }

    async fn register_agent(&self, model_endpoint: &str, price: U256) -> Result<B256> {
        let mut state = self.write().await?;
        if price.is_zero() {
            return Err(MarketError::reverted("Price must be greater than 0"));
        }
        let id = state.agents.len() as AgentId;
        state.agents.push(Agent {
            id,
            owner: self.from,
            model_endpoint: model_endpoint.to_string(),
            price,
            active: true,
        });
        state.mine();
        Ok(state.tx_hash(self.from))
    }

    async fn request_sentiment(
        &self,
        agent_id: AgentId,
        text: &str,
        payment: U256,
    ) -> Result<B256> {
        let mut state = self.write().await?;
        let agent = state
            .agents
            .get(agent_id as usize)
            .cloned()
            .ok_or_else(|| MarketError::reverted("Agent does not exist"))?;
        if !agent.active {
            return Err(MarketError::reverted("Agent not active"));
        }
        if payment != agent.price {
            return Err(MarketError::reverted("Insufficient payment"));
        }
        if text.is_empty() {
            return Err(MarketError::reverted("Text cannot be empty"));
        }
        let fee = payment * U256::from(state.fee_percent) / U256::from(100u64);
        state.total_fees += fee;
        state.request_count += 1;
        state.mine();
        Ok(state.tx_hash(self.from))
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.read()?.block)
    }

    async fn code_size(&self) -> Result<usize> {
        Ok(if self.deployed() { 4096 } else { 0 })
    }

    async fn result_events(&self, from_block: u64, to_block: u64) -> Result<Vec<SentimentResult>> {
        let state = self.read()?;
        Ok(state
            .results
            .iter()
            .filter(|r| {
                r.block_number
                    .is_some_and(|block| block >= from_block && block <= to_block)
            })
            .cloned()
            .collect())
    }

    fn events(&self) -> broadcast::Receiver<MarketplaceEvent> {
        self.chain.events.subscribe()
    }
}
