//! SentiMarket Wallet - Wallet session over an injected signing provider
//!
//! This crate answers one question for the rest of the application: do we
//! have an authorized, connected signing account, and on which network?
//!
//! - [`state`]: the pure connection state machine
//! - [`provider`]: provider and signer traits
//! - [`session`]: the async [`WalletSession`] adapter
//! - [`rpc`]: a JSON-RPC provider for endpoints that manage accounts
//! - [`sim`]: an in-memory provider for tests and simulation

pub mod provider;
pub mod rpc;
pub mod session;
pub mod sim;
pub mod state;

pub use provider::{ProviderNotification, TransactionSigner, WalletProvider};
pub use rpc::{JsonRpcWalletProvider, RpcSigner};
pub use session::{WalletSession, WalletView};
pub use sim::{SimulatedSigner, SimulatedWalletProvider};
pub use state::{reduce, ConnectionStatus, WalletEffect, WalletEvent, WalletSessionState};
