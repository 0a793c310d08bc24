//! Ethereum JSON-RPC client over HTTP

use crate::abi;
use crate::config::RpcConfig;
use alloy_primitives::{Address, Bytes, B256, U256, U64};
use sentimarket_types::{MarketError, NetworkConfig, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Wallet error code for a request the user rejected
pub const USER_REJECTED_CODE: i64 = 4001;

/// A read-only `eth_call`
#[derive(Debug, Clone, Default, Serialize)]
pub struct CallRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    pub to: Address,
    pub data: Bytes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
}

/// A state-changing transaction for `eth_sendTransaction`
#[derive(Debug, Clone, Serialize)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
}

impl TransactionRequest {
    /// The same call as a read-only simulation
    pub fn as_call(&self) -> CallRequest {
        CallRequest {
            from: Some(self.from),
            to: self.to,
            data: self.data.clone(),
            value: self.value,
        }
    }
}

/// `eth_getLogs` filter
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    pub address: Address,
    pub from_block: U64,
    pub to_block: U64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<Option<B256>>,
}

impl LogFilter {
    pub fn new(address: Address, from_block: u64, to_block: u64) -> Self {
        Self {
            address,
            from_block: U64::from(from_block),
            to_block: U64::from(to_block),
            topics: Vec::new(),
        }
    }

    /// Restrict to logs with the given `topic0`
    pub fn topic0(self, topic: B256) -> Self {
        Self {
            topics: vec![Some(topic)],
            ..self
        }
    }
}

/// A log entry returned by `eth_getLogs` or inside a receipt
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub transaction_hash: Option<B256>,
    #[serde(default)]
    pub log_index: Option<U64>,
}

impl Log {
    pub fn block(&self) -> Option<u64> {
        self.block_number.map(|n| n.to::<u64>())
    }
}

/// Transaction receipt
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: B256,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub status: Option<U64>,
    #[serde(default)]
    pub logs: Vec<Log>,
}

impl Receipt {
    /// Pre-Byzantium receipts carry no status; treat them as successful
    pub fn succeeded(&self) -> bool {
        self.status.map_or(true, |status| status == U64::from(1u64))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct BlockHeader {
    timestamp: U64,
}

/// JSON-RPC error object
#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl RpcErrorObject {
    /// Classify into the session error taxonomy.
    ///
    /// Reverts are recognised from `Error(string)` data or from the node's
    /// "execution reverted" message.
    pub fn into_market_error(self, method: &str) -> MarketError {
        if let Some(reason) = self.revert_reason() {
            return MarketError::reverted(&reason);
        }
        if self.code == USER_REJECTED_CODE {
            return MarketError::provider(format!("request rejected: {}", self.message));
        }
        let lowered = self.message.to_ascii_lowercase();
        if let Some(idx) = lowered.find("execution reverted") {
            let rest = self.message[idx + "execution reverted".len()..]
                .trim_start_matches(':')
                .trim();
            return MarketError::reverted(rest);
        }
        MarketError::rpc(method, format!("{} (code {})", self.message, self.code))
    }

    fn revert_reason(&self) -> Option<String> {
        let raw = match self.data.as_ref()? {
            Value::String(raw) => raw.clone(),
            Value::Object(map) => map.get("data")?.as_str()?.to_string(),
            _ => return None,
        };
        let bytes = abi::decode_hex(&raw).ok()?;
        abi::decode_revert(&bytes)
    }
}

/// HTTP JSON-RPC client
#[derive(Debug)]
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn from_config(config: &RpcConfig) -> Self {
        Self::new(config.url.clone())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue a raw JSON-RPC request and return its `result`
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });
        debug!(method, id, "rpc request");

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| MarketError::rpc(method, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(MarketError::rpc(method, format!("HTTP {status}: {text}")));
        }

        let mut value: Value = response
            .json()
            .await
            .map_err(|e| MarketError::rpc(method, format!("invalid response JSON: {e}")))?;

        if let Some(error) = value.get("error").cloned() {
            let error: RpcErrorObject = serde_json::from_value(error)
                .map_err(|e| MarketError::rpc(method, format!("malformed error object: {e}")))?;
            return Err(error.into_market_error(method));
        }

        value
            .get_mut("result")
            .map(Value::take)
            .ok_or_else(|| MarketError::rpc(method, "result was missing"))
    }

    /// Issue a request and deserialize its result
    pub async fn request_as<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let result = self.request(method, params).await?;
        serde_json::from_value(result)
            .map_err(|e| MarketError::rpc(method, format!("failed to decode result: {e}")))
    }

    pub async fn block_number(&self) -> Result<u64> {
        let number: U64 = self.request_as("eth_blockNumber", json!([])).await?;
        Ok(number.to::<u64>())
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let chain_id: U64 = self.request_as("eth_chainId", json!([])).await?;
        Ok(chain_id.to::<u64>())
    }

    /// Accounts already authorized, without prompting
    pub async fn accounts(&self) -> Result<Vec<Address>> {
        self.request_as("eth_accounts", json!([])).await
    }

    /// Ask the signer to authorize accounts
    pub async fn request_accounts(&self) -> Result<Vec<Address>> {
        self.request_as("eth_requestAccounts", json!([])).await
    }

    /// `eth_call` against the latest block, returning raw return data
    pub async fn call(&self, request: &CallRequest) -> Result<Vec<u8>> {
        let data: Bytes = self.request_as("eth_call", json!([request, "latest"])).await?;
        Ok(data.to_vec())
    }

    /// Deployed bytecode at `address` (empty when nothing is deployed)
    pub async fn get_code(&self, address: Address) -> Result<Vec<u8>> {
        let code: Bytes = self
            .request_as("eth_getCode", json!([address, "latest"]))
            .await?;
        Ok(code.to_vec())
    }

    pub async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>> {
        self.request_as("eth_getLogs", json!([filter])).await
    }

    /// Timestamp (seconds) of a block, `None` if the node does not know it
    pub async fn block_timestamp(&self, number: u64) -> Result<Option<u64>> {
        let header: Option<BlockHeader> = self
            .request_as(
                "eth_getBlockByNumber",
                json!([format!("{number:#x}"), false]),
            )
            .await?;
        Ok(header.map(|h| h.timestamp.to::<u64>()))
    }

    pub async fn send_transaction(&self, tx: &TransactionRequest) -> Result<B256> {
        self.request_as("eth_sendTransaction", json!([tx])).await
    }

    pub async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>> {
        self.request_as("eth_getTransactionReceipt", json!([hash]))
            .await
    }

    /// Poll until the transaction is included.
    ///
    /// No overall deadline is applied; a transaction that is never mined
    /// keeps the caller waiting.
    pub async fn wait_for_receipt(&self, hash: B256, poll_interval: Duration) -> Result<Receipt> {
        loop {
            if let Some(receipt) = self.transaction_receipt(hash).await? {
                return Ok(receipt);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// `wallet_addEthereumChain`
    pub async fn add_chain(&self, network: &NetworkConfig) -> Result<()> {
        self.request("wallet_addEthereumChain", json!([network.add_chain_params()]))
            .await
            .map(|_| ())
    }

    /// `wallet_switchEthereumChain`
    pub async fn switch_chain(&self, chain_id: u64) -> Result<()> {
        self.request(
            "wallet_switchEthereumChain",
            json!([{ "chainId": format!("{chain_id:#x}") }]),
        )
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{encode_params, Token, ERROR_STRING_SELECTOR};

    fn revert_data(message: &str) -> String {
        let mut data = ERROR_STRING_SELECTOR.to_vec();
        data.extend_from_slice(&encode_params(&[Token::String(message.to_string())]));
        abi::encode_hex(&data)
    }

    #[test]
    fn error_with_revert_data_becomes_call_reverted() {
        let error = RpcErrorObject {
            code: 3,
            message: "execution reverted".to_string(),
            data: Some(Value::String(revert_data("Insufficient payment"))),
        };
        assert!(error.into_market_error("eth_call").is_insufficient_payment());
    }

    #[test]
    fn revert_message_without_data_is_recognised() {
        let error = RpcErrorObject {
            code: -32000,
            message: "execution reverted: Agent not active".to_string(),
            data: None,
        };
        assert!(matches!(
            error.into_market_error("eth_call"),
            MarketError::CallReverted {
                reason: sentimarket_types::RevertReason::AgentNotActive
            }
        ));
    }

    #[test]
    fn user_rejection_is_a_provider_error() {
        let error = RpcErrorObject {
            code: USER_REJECTED_CODE,
            message: "User rejected the request.".to_string(),
            data: None,
        };
        assert!(matches!(
            error.into_market_error("wallet_switchEthereumChain"),
            MarketError::Provider { .. }
        ));
    }

    #[test]
    fn other_errors_are_rpc_errors() {
        let error = RpcErrorObject {
            code: -32601,
            message: "method not found".to_string(),
            data: None,
        };
        assert_eq!(error.into_market_error("eth_foo").error_code(), "RPC_ERROR");
    }

    #[test]
    fn log_deserializes_from_node_json() {
        let raw = json!({
            "address": "0x00000000000000000000000000000000000000aa",
            "topics": ["0x0000000000000000000000000000000000000000000000000000000000000001"],
            "data": "0x",
            "blockNumber": "0x10",
            "transactionHash": null,
            "logIndex": "0x0"
        });
        let log: Log = serde_json::from_value(raw).unwrap();
        assert_eq!(log.block(), Some(16));
        assert!(log.data.is_empty());
    }

    #[test]
    fn receipt_status() {
        let receipt: Receipt = serde_json::from_value(json!({
            "transactionHash": "0x0000000000000000000000000000000000000000000000000000000000000001",
            "blockNumber": "0x2",
            "status": "0x0",
            "logs": []
        }))
        .unwrap();
        assert!(!receipt.succeeded());
    }

    #[test]
    fn log_filter_serializes_hex_blocks() {
        let filter = LogFilter::new(Address::ZERO, 10, 60);
        let value = serde_json::to_value(&filter).unwrap();
        assert_eq!(value["fromBlock"], "0xa");
        assert_eq!(value["toBlock"], "0x3c");
        assert!(value.get("topics").is_none());
    }
}
