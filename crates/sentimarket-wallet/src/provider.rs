//! Signing provider abstraction
//!
//! A `WalletProvider` is the injected collaborator that holds the user's
//! accounts (a browser extension, a node with unlocked accounts, or the
//! in-memory simulator). It hands out `TransactionSigner`s and pushes
//! account/chain change notifications.

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use sentimarket_rpc::TransactionRequest;
use sentimarket_types::{NetworkConfig, Result};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of provider notification channels
pub const NOTIFICATION_CAPACITY: usize = 64;

/// Change pushed by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderNotification {
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
}

/// Signs and submits state-changing transactions for one account
#[async_trait]
pub trait TransactionSigner: Send + Sync + fmt::Debug {
    /// The signing account
    fn address(&self) -> Address;

    /// Submit a transaction, returning its hash once accepted by the node
    async fn send_transaction(&self, tx: TransactionRequest) -> Result<B256>;
}

/// An injected wallet provider
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &'static str;

    /// Ask the user to authorize accounts
    async fn request_accounts(&self) -> Result<Vec<Address>>;

    /// Signer for an authorized account
    async fn get_signer(&self, account: Address) -> Result<Arc<dyn TransactionSigner>>;

    /// Chain id the provider is currently on
    async fn get_network(&self) -> Result<u64>;

    /// Ask the provider to add a chain configuration
    async fn add_chain(&self, network: &NetworkConfig) -> Result<()>;

    /// Ask the provider to switch to a chain
    async fn switch_chain(&self, chain_id: u64) -> Result<()>;

    /// Subscribe to account/chain change notifications
    fn notifications(&self) -> broadcast::Receiver<ProviderNotification>;
}
