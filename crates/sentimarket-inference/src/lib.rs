//! SentiMarket Inference - Text-classification backends and sentiment analysis
//!
//! This crate is consumed by the CLI's analysis commands; the session and
//! liveness layers do not depend on it.
//!
//! ## Backends
//! - Hugging Face hosted inference (default): `https://api-inference.huggingface.co/models`
//! - Lexicon: offline word-list classifier, no network or API key
//!
//! Services take their backend as an explicit constructor argument; there
//! are no process-wide instances.

pub mod catalog;
pub mod providers;
pub mod service;
pub mod types;

pub use providers::*;
pub use service::*;
pub use types::*;
