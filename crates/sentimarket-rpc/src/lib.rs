//! SentiMarket RPC - Ethereum JSON-RPC transport
//!
//! A thin HTTP JSON-RPC client for the handful of `eth_*` and `wallet_*`
//! methods the session layer needs, plus the ABI helpers used to talk to
//! the marketplace contract. Chain calls carry no per-call timeout.

pub mod abi;
pub mod client;
pub mod config;

pub use abi::{AbiError, Decoder, Token};
pub use client::{
    CallRequest, Log, LogFilter, Receipt, RpcClient, RpcErrorObject, TransactionRequest,
};
pub use config::RpcConfig;
