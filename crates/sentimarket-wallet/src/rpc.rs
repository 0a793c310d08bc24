//! Wallet provider backed by a JSON-RPC signer endpoint
//!
//! Works against any endpoint that manages accounts itself and accepts
//! `eth_sendTransaction` (a dev node, a signing proxy, a remote wallet
//! bridge). Account and chain changes are detected by polling, since plain
//! HTTP has no push channel.

use crate::provider::{
    ProviderNotification, TransactionSigner, WalletProvider, NOTIFICATION_CAPACITY,
};
use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use parking_lot::Mutex;
use sentimarket_rpc::{RpcClient, RpcConfig, TransactionRequest};
use sentimarket_types::{NetworkConfig, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// JSON-RPC wallet provider
pub struct JsonRpcWalletProvider {
    client: Arc<RpcClient>,
    preferred_account: Option<Address>,
    poll_interval: Duration,
    notifications: broadcast::Sender<ProviderNotification>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl JsonRpcWalletProvider {
    pub fn new(config: &RpcConfig) -> Self {
        Self::with_client(
            Arc::new(RpcClient::from_config(config)),
            config.notification_poll_interval,
        )
    }

    pub fn with_client(client: Arc<RpcClient>, poll_interval: Duration) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            client,
            preferred_account: None,
            poll_interval,
            notifications,
            watcher: Mutex::new(None),
        }
    }

    /// Put `account` first whenever the endpoint authorizes it
    pub fn with_preferred_account(mut self, account: Option<Address>) -> Self {
        self.preferred_account = account;
        self
    }

    fn order_accounts(&self, accounts: Vec<Address>) -> Vec<Address> {
        prefer(accounts, self.preferred_account)
    }

    /// Start the change poller on first subscription
    fn ensure_watcher(&self) {
        let mut watcher = self.watcher.lock();
        if watcher.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let client = Arc::clone(&self.client);
        let sender = self.notifications.clone();
        let poll_interval = self.poll_interval;
        let preferred = self.preferred_account;

        *watcher = Some(tokio::spawn(async move {
            let mut last_accounts: Option<Vec<Address>> = None;
            let mut last_chain: Option<u64> = None;
            let mut ticker = tokio::time::interval(poll_interval);

            loop {
                ticker.tick().await;

                match client.accounts().await {
                    Ok(accounts) => {
                        let accounts = prefer(accounts, preferred);
                        if last_accounts.as_ref().is_some_and(|prev| *prev != accounts) {
                            let _ = sender.send(ProviderNotification::AccountsChanged(
                                accounts.clone(),
                            ));
                        }
                        last_accounts = Some(accounts);
                    }
                    Err(err) => debug!(error = %err, "eth_accounts poll failed"),
                }

                match client.chain_id().await {
                    Ok(chain_id) => {
                        if last_chain.is_some_and(|prev| prev != chain_id) {
                            let _ = sender.send(ProviderNotification::ChainChanged(chain_id));
                        }
                        last_chain = Some(chain_id);
                    }
                    Err(err) => debug!(error = %err, "eth_chainId poll failed"),
                }
            }
        }));
    }
}

fn prefer(mut accounts: Vec<Address>, preferred: Option<Address>) -> Vec<Address> {
    if let Some(pos) = preferred.and_then(|p| accounts.iter().position(|a| *a == p)) {
        accounts.swap(0, pos);
    }
    accounts
}

impl Drop for JsonRpcWalletProvider {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher.lock().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl WalletProvider for JsonRpcWalletProvider {
    fn name(&self) -> &'static str {
        "json-rpc"
    }

    async fn request_accounts(&self) -> Result<Vec<Address>> {
        let accounts = match self.client.request_accounts().await {
            Ok(accounts) => accounts,
            // plain nodes do not implement eth_requestAccounts
            Err(err) => {
                debug!(error = %err, "eth_requestAccounts unavailable, using eth_accounts");
                self.client.accounts().await?
            }
        };
        Ok(self.order_accounts(accounts))
    }

    async fn get_signer(&self, account: Address) -> Result<Arc<dyn TransactionSigner>> {
        Ok(Arc::new(RpcSigner {
            client: Arc::clone(&self.client),
            address: account,
        }))
    }

    async fn get_network(&self) -> Result<u64> {
        self.client.chain_id().await
    }

    async fn add_chain(&self, network: &NetworkConfig) -> Result<()> {
        self.client.add_chain(network).await
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<()> {
        self.client.switch_chain(chain_id).await?;
        info!(chain_id, "Switch chain accepted by signer endpoint");
        Ok(())
    }

    fn notifications(&self) -> broadcast::Receiver<ProviderNotification> {
        let receiver = self.notifications.subscribe();
        self.ensure_watcher();
        receiver
    }
}

/// Signer that delegates to the endpoint's `eth_sendTransaction`
#[derive(Debug)]
pub struct RpcSigner {
    client: Arc<RpcClient>,
    address: Address,
}

#[async_trait]
impl TransactionSigner for RpcSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<B256> {
        let hash = self.client.send_transaction(&tx).await?;
        debug!(tx_hash = %hash, from = %self.address, "Transaction submitted");
        Ok(hash)
    }
}
