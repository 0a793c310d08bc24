//! In-memory wallet provider for tests and `--simulate` runs

use crate::provider::{
    ProviderNotification, TransactionSigner, WalletProvider, NOTIFICATION_CAPACITY,
};
use alloy_primitives::{keccak256, Address, B256};
use async_trait::async_trait;
use parking_lot::Mutex;
use sentimarket_rpc::TransactionRequest;
use sentimarket_types::{MarketError, NetworkConfig, Result};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

#[derive(Debug, Default)]
struct SimState {
    accounts: Vec<Address>,
    chain_id: u64,
    decline_network_requests: bool,
    added_chains: Vec<u64>,
}

/// A wallet provider whose accounts and chain are set programmatically.
///
/// Changes made through [`set_accounts`](Self::set_accounts) and
/// [`set_chain`](Self::set_chain) are pushed as notifications, like a
/// browser wallet would.
pub struct SimulatedWalletProvider {
    state: Mutex<SimState>,
    sent: Arc<Mutex<Vec<TransactionRequest>>>,
    hold: watch::Sender<bool>,
    notifications: broadcast::Sender<ProviderNotification>,
}

impl SimulatedWalletProvider {
    pub fn new(accounts: Vec<Address>, chain_id: u64) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let (hold, _) = watch::channel(false);
        Self {
            state: Mutex::new(SimState {
                accounts,
                chain_id,
                ..SimState::default()
            }),
            sent: Arc::new(Mutex::new(Vec::new())),
            hold,
            notifications,
        }
    }

    /// Replace the authorized accounts and notify listeners
    pub fn set_accounts(&self, accounts: Vec<Address>) {
        self.state.lock().accounts = accounts.clone();
        let _ = self
            .notifications
            .send(ProviderNotification::AccountsChanged(accounts));
    }

    /// Move to another chain and notify listeners
    pub fn set_chain(&self, chain_id: u64) {
        self.state.lock().chain_id = chain_id;
        let _ = self
            .notifications
            .send(ProviderNotification::ChainChanged(chain_id));
    }

    /// Block account requests until [`release_requests`](Self::release_requests)
    pub fn hold_requests(&self) {
        self.hold.send_replace(true);
    }

    pub fn release_requests(&self) {
        self.hold.send_replace(false);
    }

    /// Make add/switch chain requests fail, as if the user declined
    pub fn decline_network_requests(&self, decline: bool) {
        self.state.lock().decline_network_requests = decline;
    }

    /// Chain ids passed to `add_chain`, in order
    pub fn added_chains(&self) -> Vec<u64> {
        self.state.lock().added_chains.clone()
    }

    /// Transactions submitted through this provider's signers
    pub fn sent_transactions(&self) -> Vec<TransactionRequest> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl WalletProvider for SimulatedWalletProvider {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn request_accounts(&self) -> Result<Vec<Address>> {
        let mut hold = self.hold.subscribe();
        let _ = hold.wait_for(|held| !*held).await;
        Ok(self.state.lock().accounts.clone())
    }

    async fn get_signer(&self, account: Address) -> Result<Arc<dyn TransactionSigner>> {
        if !self.state.lock().accounts.contains(&account) {
            return Err(MarketError::provider(format!(
                "account {account} is not authorized"
            )));
        }
        Ok(Arc::new(SimulatedSigner {
            address: account,
            sent: Arc::clone(&self.sent),
        }))
    }

    async fn get_network(&self) -> Result<u64> {
        Ok(self.state.lock().chain_id)
    }

    async fn add_chain(&self, network: &NetworkConfig) -> Result<()> {
        let mut state = self.state.lock();
        state.added_chains.push(network.chain_id);
        if state.decline_network_requests {
            return Err(MarketError::provider("user rejected add chain request"));
        }
        Ok(())
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<()> {
        if self.state.lock().decline_network_requests {
            return Err(MarketError::provider("user rejected switch chain request"));
        }
        self.set_chain(chain_id);
        Ok(())
    }

    fn notifications(&self) -> broadcast::Receiver<ProviderNotification> {
        self.notifications.subscribe()
    }
}

/// Signer that records transactions instead of broadcasting them
#[derive(Debug)]
pub struct SimulatedSigner {
    address: Address,
    sent: Arc<Mutex<Vec<TransactionRequest>>>,
}

impl SimulatedSigner {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl TransactionSigner for SimulatedSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<B256> {
        let mut sent = self.sent.lock();
        let mut preimage = tx.data.to_vec();
        preimage.extend_from_slice(&(sent.len() as u64).to_be_bytes());
        sent.push(tx);
        Ok(keccak256(preimage))
    }
}
