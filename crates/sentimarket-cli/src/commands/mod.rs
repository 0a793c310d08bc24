//! Command implementations

pub mod analyze;
pub mod market;
pub mod simulation;
pub mod watch;
