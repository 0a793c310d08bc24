//! SentiMarket Liveness - Is the off-chain worker alive?
//!
//! The worker cannot be asked directly, so its health is inferred from two
//! sources that update independently:
//!
//! - a periodic refresh of platform statistics, worker identity and a scan
//!   of the trailing block window for result events
//! - the live contract event stream, which marks the worker online the
//!   moment a result lands and triggers an immediate refresh when a worker
//!   registers
//!
//! Both feed one immutable [`LivenessSnapshot`], replaced as a whole on
//! every update. Read failures are recorded on the snapshot and never
//! clear what was already known.

pub mod config;
pub mod monitor;
pub mod snapshot;

pub use config::LivenessConfig;
pub use monitor::LivenessMonitor;
pub use snapshot::{LivenessSnapshot, RefreshReading, WorkerIdentity};
