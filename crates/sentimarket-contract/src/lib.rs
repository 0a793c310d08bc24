//! SentiMarket Contract - Verified marketplace contract binding
//!
//! The contract session follows the wallet session and keeps exactly one
//! probed contract handle for the current account and chain:
//!
//! - [`state`]: the pure binding state machine
//! - [`binding`]: the typed contract interface and connector trait
//! - [`session`]: the [`ContractSession`] adapter and its wallet reactor
//! - [`rpc`]: a JSON-RPC binding using the marketplace ABI
//! - [`sim`]: an in-memory marketplace chain for tests and simulation
//!
//! A handle is published only after a read-only probe (`agent_count`)
//! succeeds against it, and it is withdrawn as soon as the wallet leaves
//! the identity it was bound for.

pub mod binding;
pub mod rpc;
pub mod session;
pub mod sim;
pub mod state;
mod subscription;

pub use binding::{ContractConnector, MarketplaceContract, MarketplaceEvent};
pub use rpc::{RpcConnector, RpcMarketplace};
pub use session::{BoundContract, ContractDiagnostics, ContractSession, ContractView};
pub use sim::{SimulatedChain, SimulatedConnector, SimulatedMarketplace};
pub use state::{reduce, BindingEvent, BindingStatus, ContractSessionState};
pub use subscription::SubscriptionHandle;
