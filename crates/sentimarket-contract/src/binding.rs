//! Typed marketplace contract interface

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use sentimarket_types::{Agent, AgentId, PlatformStatsReading, Result, SentimentResult};
use sentimarket_wallet::TransactionSigner;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of live contract event channels
pub const EVENT_CAPACITY: usize = 256;

/// Event emitted by the marketplace contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketplaceEvent {
    /// The off-chain worker wrote a result back
    SentimentResult(SentimentResult),
    /// A worker identity was (re)registered
    WorkerRegistered { app_id: B256, worker: Address },
}

/// A constructed contract handle bound to one signer.
///
/// Writes submit a transaction and return once it is included; a reverted
/// inclusion surfaces as `CallReverted`.
#[async_trait]
pub trait MarketplaceContract: Send + Sync {
    /// Address the handle talks to
    fn address(&self) -> Address;

    async fn agent_count(&self) -> Result<u64>;

    /// Agent record at on-chain index `index`
    async fn agent(&self, index: AgentId) -> Result<Agent>;

    async fn platform_stats(&self) -> Result<PlatformStatsReading>;

    async fn worker_app_id(&self) -> Result<B256>;

    async fn worker_address(&self) -> Result<Address>;

    async fn worker_enabled(&self) -> Result<bool>;

    async fn register_agent(&self, model_endpoint: &str, price: U256) -> Result<B256>;

    async fn request_sentiment(&self, agent_id: AgentId, text: &str, payment: U256)
        -> Result<B256>;

    async fn block_number(&self) -> Result<u64>;

    /// Size of the deployed bytecode at the handle's address
    async fn code_size(&self) -> Result<usize>;

    /// Result events in `[from_block, to_block]`, stamped with block time
    async fn result_events(&self, from_block: u64, to_block: u64)
        -> Result<Vec<SentimentResult>>;

    /// Live events from now on
    fn events(&self) -> broadcast::Receiver<MarketplaceEvent>;

    /// Stop any background work backing [`events`](Self::events)
    fn close(&self) {}
}

/// Builds contract handles for a signer
#[async_trait]
pub trait ContractConnector: Send + Sync {
    async fn connect(
        &self,
        address: Address,
        signer: Arc<dyn TransactionSigner>,
        chain_id: u64,
    ) -> Result<Arc<dyn MarketplaceContract>>;
}
