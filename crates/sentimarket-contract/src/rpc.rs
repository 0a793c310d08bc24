//! Marketplace binding over Ethereum JSON-RPC
//!
//! Calls are ABI-encoded by hand against the marketplace's function
//! signatures. Writes are simulated with `eth_call` first so a revert reason
//! is available before anything is signed, then submitted through the
//! wallet's signer and awaited. Live events come from a log follower that
//! polls `eth_getLogs` for new blocks.

use crate::binding::{ContractConnector, MarketplaceContract, MarketplaceEvent, EVENT_CAPACITY};
use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sentimarket_rpc::abi::{self, Decoder, Token};
use sentimarket_rpc::{CallRequest, Log, LogFilter, RpcClient, RpcConfig, TransactionRequest};
use sentimarket_types::{
    Agent, AgentId, MarketError, PlatformStats, PlatformStatsReading, RevertReason, Result,
    SentimentResult,
};
use sentimarket_wallet::TransactionSigner;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Marketplace function and event signatures
pub mod signatures {
    pub const GET_AGENT_COUNT: &str = "getAgentCount()";
    pub const AGENTS: &str = "agents(uint256)";
    pub const GET_PLATFORM_STATS: &str = "getPlatformStats()";
    pub const EXPECTED_APP_ID: &str = "expectedROFLAppId()";
    pub const WORKER_ADDRESS: &str = "roflWorkerAddress()";
    pub const WORKER_ENABLED: &str = "roflEnabled()";
    pub const REGISTER_AGENT: &str = "registerAgent(string,uint256)";
    pub const REQUEST_SENTIMENT: &str = "requestSentiment(uint256,string)";

    pub const SENTIMENT_RESULT_EVENT: &str = "SentimentResult(uint256,string,uint256,address)";
    pub const WORKER_REGISTERED_EVENT: &str = "ROFLWorkerRegistered(bytes32,address)";
}

/// Builds [`RpcMarketplace`] handles sharing one client
pub struct RpcConnector {
    client: Arc<RpcClient>,
    receipt_poll: Duration,
    event_poll: Duration,
}

impl RpcConnector {
    pub fn new(config: &RpcConfig) -> Self {
        Self::with_client(Arc::new(RpcClient::from_config(config)), config)
    }

    pub fn with_client(client: Arc<RpcClient>, config: &RpcConfig) -> Self {
        Self {
            client,
            receipt_poll: config.receipt_poll_interval,
            event_poll: config.event_poll_interval,
        }
    }
}

#[async_trait]
impl ContractConnector for RpcConnector {
    async fn connect(
        &self,
        address: Address,
        signer: Arc<dyn TransactionSigner>,
        chain_id: u64,
    ) -> Result<Arc<dyn MarketplaceContract>> {
        let node_chain = self.client.chain_id().await?;
        if node_chain != chain_id {
            return Err(MarketError::BindingFailed {
                address: address.to_string(),
                reason: format!(
                    "RPC endpoint is on chain {node_chain} but the wallet is on chain {chain_id}"
                ),
            });
        }
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Arc::new(RpcMarketplace {
            client: Arc::clone(&self.client),
            signer,
            address,
            receipt_poll: self.receipt_poll,
            event_poll: self.event_poll,
            events,
            follower: Mutex::new(None),
        }))
    }
}

/// Contract handle over JSON-RPC
pub struct RpcMarketplace {
    client: Arc<RpcClient>,
    signer: Arc<dyn TransactionSigner>,
    address: Address,
    receipt_poll: Duration,
    event_poll: Duration,
    events: broadcast::Sender<MarketplaceEvent>,
    follower: Mutex<Option<JoinHandle<()>>>,
}

impl RpcMarketplace {
    async fn read(&self, signature: &str, args: &[Token]) -> Result<Vec<u8>> {
        let data = self
            .client
            .call(&CallRequest {
                from: None,
                to: self.address,
                data: Bytes::from(abi::encode_call(signature, args)),
                value: None,
            })
            .await?;
        if data.is_empty() {
            return Err(MarketError::rpc(
                "eth_call",
                format!("{signature} returned no data; is a contract deployed at {}?", self.address),
            ));
        }
        Ok(data)
    }

    async fn transact(&self, signature: &str, args: &[Token], value: Option<U256>) -> Result<B256> {
        let tx = TransactionRequest {
            from: self.signer.address(),
            to: self.address,
            data: Bytes::from(abi::encode_call(signature, args)),
            value,
        };
        // surfaces the revert reason before anything is signed
        self.client.call(&tx.as_call()).await?;

        let hash = self.signer.send_transaction(tx).await?;
        let receipt = self.client.wait_for_receipt(hash, self.receipt_poll).await?;
        if !receipt.succeeded() {
            return Err(MarketError::CallReverted {
                reason: RevertReason::Unknown,
            });
        }
        debug!(tx_hash = %hash, signature, "Transaction included");
        Ok(hash)
    }

    fn start_follower(&self) {
        let mut follower = self.follower.lock();
        if follower.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let client = Arc::clone(&self.client);
        let sender = self.events.clone();
        let address = self.address;
        let poll = self.event_poll;

        *follower = Some(tokio::spawn(async move {
            let mut next_block: Option<u64> = None;
            let mut ticker = tokio::time::interval(poll);
            loop {
                ticker.tick().await;
                let head = match client.block_number().await {
                    Ok(head) => head,
                    Err(err) => {
                        debug!(error = %err, "Log follower could not read block number");
                        continue;
                    }
                };
                let Some(from) = next_block else {
                    next_block = Some(head + 1);
                    continue;
                };
                if from > head {
                    continue;
                }
                match client.get_logs(&LogFilter::new(address, from, head)).await {
                    Ok(logs) => {
                        for log in &logs {
                            if let Some(event) = decode_event(log, Utc::now()) {
                                let _ = sender.send(event);
                            }
                        }
                        next_block = Some(head + 1);
                    }
                    Err(err) => warn!(error = %err, from, head, "Log follower poll failed"),
                }
            }
        }));
    }
}

impl Drop for RpcMarketplace {
    fn drop(&mut self) {
        self.close();
    }
}

#[async_trait]
impl MarketplaceContract for RpcMarketplace {
    fn address(&self) -> Address {
        self.address
    }

    async fn agent_count(&self) -> Result<u64> {
        let data = self.read(signatures::GET_AGENT_COUNT, &[]).await?;
        Ok(Decoder::new(&data).uint_u64(0)?)
    }

    async fn agent(&self, index: AgentId) -> Result<Agent> {
        let data = self
            .read(signatures::AGENTS, &[Token::Uint(U256::from(index))])
            .await?;
        Ok(decode_agent(index, &data)?)
    }

    async fn platform_stats(&self) -> Result<PlatformStatsReading> {
        let data = self.read(signatures::GET_PLATFORM_STATS, &[]).await?;
        Ok(decode_platform_stats(&data)?)
    }

    async fn worker_app_id(&self) -> Result<B256> {
        let data = self.read(signatures::EXPECTED_APP_ID, &[]).await?;
        Ok(Decoder::new(&data).fixed_bytes(0)?)
    }

    async fn worker_address(&self) -> Result<Address> {
        let data = self.read(signatures::WORKER_ADDRESS, &[]).await?;
        Ok(Decoder::new(&data).address(0)?)
    }

    async fn worker_enabled(&self) -> Result<bool> {
        let data = self.read(signatures::WORKER_ENABLED, &[]).await?;
        Ok(Decoder::new(&data).bool(0)?)
    }

    async fn register_agent(&self, model_endpoint: &str, price: U256) -> Result<B256> {
        self.transact(
            signatures::REGISTER_AGENT,
            &[Token::String(model_endpoint.to_string()), Token::Uint(price)],
            None,
        )
        .await
    }

    async fn request_sentiment(
        &self,
        agent_id: AgentId,
        text: &str,
        payment: U256,
    ) -> Result<B256> {
        self.transact(
            signatures::REQUEST_SENTIMENT,
            &[Token::Uint(U256::from(agent_id)), Token::String(text.to_string())],
            Some(payment),
        )
        .await
    }

    async fn block_number(&self) -> Result<u64> {
        self.client.block_number().await
    }

    async fn code_size(&self) -> Result<usize> {
        Ok(self.client.get_code(self.address).await?.len())
    }

    async fn result_events(&self, from_block: u64, to_block: u64) -> Result<Vec<SentimentResult>> {
        let filter = LogFilter::new(self.address, from_block, to_block)
            .topic0(abi::event_topic(signatures::SENTIMENT_RESULT_EVENT));
        let logs = self.client.get_logs(&filter).await?;

        let mut timestamps: HashMap<u64, DateTime<Utc>> = HashMap::new();
        let mut results = Vec::with_capacity(logs.len());
        for log in &logs {
            let observed_at = match log.block() {
                Some(block) => match timestamps.get(&block) {
                    Some(at) => *at,
                    None => {
                        let at = self
                            .client
                            .block_timestamp(block)
                            .await?
                            .and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
                            .unwrap_or_else(Utc::now);
                        timestamps.insert(block, at);
                        at
                    }
                },
                None => Utc::now(),
            };
            match decode_result(log, observed_at) {
                Ok(result) => results.push(result),
                Err(err) => warn!(error = %err, "Skipping undecodable result log"),
            }
        }
        Ok(results)
    }

    fn events(&self) -> broadcast::Receiver<MarketplaceEvent> {
        let receiver = self.events.subscribe();
        self.start_follower();
        receiver
    }

    fn close(&self) {
        if let Some(task) = self.follower.lock().take() {
            task.abort();
        }
    }
}

/// `agents(uint256)` returns `(address owner, string modelUrl, uint256 price, bool active)`
fn decode_agent(id: AgentId, data: &[u8]) -> std::result::Result<Agent, abi::AbiError> {
    let decoder = Decoder::new(data);
    Ok(Agent {
        id,
        owner: decoder.address(0)?,
        model_endpoint: decoder.string(1)?,
        price: decoder.uint(2)?,
        active: decoder.bool(3)?,
    })
}

/// `getPlatformStats()` returns
/// `(totalAgents, totalRequests, totalFees, feePercent, roflActive)`
fn decode_platform_stats(data: &[u8]) -> std::result::Result<PlatformStatsReading, abi::AbiError> {
    let decoder = Decoder::new(data);
    Ok(PlatformStatsReading {
        stats: PlatformStats {
            agent_count: decoder.uint_u64(0)?,
            request_count: decoder.uint_u64(1)?,
            total_fees: decoder.uint(2)?,
            fee_bps: decoder.uint_u64(3)?.saturating_mul(100),
        },
        worker_enabled: decoder.bool(4)?,
    })
}

/// Decode a result log; `requestId` may be indexed or carried in data
fn decode_result(
    log: &Log,
    observed_at: DateTime<Utc>,
) -> std::result::Result<SentimentResult, abi::AbiError> {
    let decoder = Decoder::new(&log.data);
    let (request_id, label, confidence, worker) = match log.topics.get(1) {
        Some(indexed) => (
            U256::from_be_bytes(indexed.0),
            decoder.string(0)?,
            decoder.uint(1)?,
            decoder.address(2)?,
        ),
        None => (
            decoder.uint(0)?,
            decoder.string(1)?,
            decoder.uint(2)?,
            decoder.address(3)?,
        ),
    };
    let mut result = SentimentResult::from_raw(request_id, &label, confidence, observed_at)
        .with_worker(worker);
    if let Some(block) = log.block() {
        result = result.with_block(block);
    }
    Ok(result)
}

fn decode_worker_registered(log: &Log) -> std::result::Result<(B256, Address), abi::AbiError> {
    if let [_, app_id, worker, ..] = log.topics.as_slice() {
        return Ok((*app_id, Address::from_word(*worker)));
    }
    let decoder = Decoder::new(&log.data);
    Ok((decoder.fixed_bytes(0)?, decoder.address(1)?))
}

/// Dispatch a raw log on its `topic0`
fn decode_event(log: &Log, observed_at: DateTime<Utc>) -> Option<MarketplaceEvent> {
    let topic0 = log.topics.first()?;
    let decoded = if *topic0 == abi::event_topic(signatures::SENTIMENT_RESULT_EVENT) {
        decode_result(log, observed_at).map(MarketplaceEvent::SentimentResult)
    } else if *topic0 == abi::event_topic(signatures::WORKER_REGISTERED_EVENT) {
        decode_worker_registered(log)
            .map(|(app_id, worker)| MarketplaceEvent::WorkerRegistered { app_id, worker })
    } else {
        return None;
    };
    match decoded {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(error = %err, "Skipping undecodable marketplace log");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U64;
    use sentimarket_types::{parse_native, Sentiment};

    fn log(topics: Vec<B256>, data: Vec<u8>) -> Log {
        Log {
            address: Address::repeat_byte(0xcc),
            topics,
            data: Bytes::from(data),
            block_number: Some(U64::from(42u64)),
            transaction_hash: None,
            log_index: None,
        }
    }

    #[test]
    fn test_decode_agent_tuple() {
        let owner = Address::repeat_byte(0x11);
        let data = abi::encode_params(&[
            Token::Address(owner),
            Token::String("https://api-inference.huggingface.co/models/x".to_string()),
            Token::Uint(parse_native("0.2").unwrap()),
            Token::Bool(true),
        ]);
        let agent = decode_agent(3, &data).unwrap();
        assert_eq!(agent.id, 3);
        assert_eq!(agent.owner, owner);
        assert_eq!(agent.model_id(), "x");
        assert_eq!(agent.price_display(), "0.2");
        assert!(agent.active);
    }

    #[test]
    fn test_decode_platform_stats_scales_fee() {
        let data = abi::encode_params(&[
            Token::Uint(U256::from(4u64)),
            Token::Uint(U256::from(19u64)),
            Token::Uint(U256::from(1000u64)),
            Token::Uint(U256::from(5u64)),
            Token::Bool(true),
        ]);
        let reading = decode_platform_stats(&data).unwrap();
        assert_eq!(reading.stats.agent_count, 4);
        assert_eq!(reading.stats.request_count, 19);
        assert_eq!(reading.stats.fee_bps, 500);
        assert!(reading.worker_enabled);
    }

    #[test]
    fn test_decode_result_both_layouts() {
        let topic0 = abi::event_topic(signatures::SENTIMENT_RESULT_EVENT);
        let worker = Address::repeat_byte(0x77);
        let now = Utc::now();

        let indexed = log(
            vec![topic0, B256::from(U256::from(9u64).to_be_bytes::<32>())],
            abi::encode_params(&[
                Token::String("POSITIVE".to_string()),
                Token::Uint(U256::from(250u64)),
                Token::Address(worker),
            ]),
        );
        let Some(MarketplaceEvent::SentimentResult(result)) = decode_event(&indexed, now) else {
            panic!("expected a result event");
        };
        assert_eq!(result.request_id, U256::from(9u64));
        assert_eq!(result.sentiment, Sentiment::Positive);
        assert_eq!(result.confidence, 100);
        assert_eq!(result.block_number, Some(42));
        assert_eq!(result.worker, Some(worker));

        let plain = log(
            vec![topic0],
            abi::encode_params(&[
                Token::Uint(U256::from(10u64)),
                Token::String("negative".to_string()),
                Token::Uint(U256::from(64u64)),
                Token::Address(worker),
            ]),
        );
        let result = decode_result(&plain, now).unwrap();
        assert_eq!(result.request_id, U256::from(10u64));
        assert_eq!(result.sentiment, Sentiment::Negative);
        assert_eq!(result.confidence, 64);
    }

    #[test]
    fn test_decode_worker_registered() {
        let topic0 = abi::event_topic(signatures::WORKER_REGISTERED_EVENT);
        let app_id = B256::repeat_byte(0xab);
        let worker = Address::repeat_byte(0x55);

        let from_data = log(
            vec![topic0],
            abi::encode_params(&[Token::FixedBytes(app_id), Token::Address(worker)]),
        );
        assert_eq!(
            decode_event(&from_data, Utc::now()),
            Some(MarketplaceEvent::WorkerRegistered { app_id, worker })
        );

        let from_topics = log(vec![topic0, app_id, worker.into_word()], Vec::new());
        assert_eq!(
            decode_event(&from_topics, Utc::now()),
            Some(MarketplaceEvent::WorkerRegistered { app_id, worker })
        );
    }

    #[test]
    fn test_unknown_and_truncated_logs_are_skipped() {
        assert_eq!(decode_event(&log(vec![B256::ZERO], Vec::new()), Utc::now()), None);
        assert_eq!(decode_event(&log(Vec::new(), Vec::new()), Utc::now()), None);
        let truncated = log(
            vec![abi::event_topic(signatures::SENTIMENT_RESULT_EVENT)],
            vec![0u8; 16],
        );
        assert_eq!(decode_event(&truncated, Utc::now()), None);
    }
}
