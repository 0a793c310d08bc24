//! Error types for SentiMarket sessions
//!
//! Operation-level failures surface to the caller as a `MarketError`.
//! Background failures are recorded as an `ErrorInfo` on the state they
//! concern and never thrown into unrelated call sites.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for SentiMarket operations
pub type Result<T> = std::result::Result<T, MarketError>;

/// Why the chain rejected a state-changing call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "message", rename_all = "snake_case")]
pub enum RevertReason {
    /// Attached value does not match the agent's price
    InsufficientPayment,
    /// The target agent has been deactivated
    AgentNotActive,
    /// Any other revert string reported by the contract
    Message(String),
    /// The transaction was included with a failed status and no reason
    Unknown,
}

impl RevertReason {
    /// Classify a revert string returned by the contract.
    pub fn from_message(message: &str) -> Self {
        let normalized = message.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Self::Unknown;
        }
        if normalized.contains("insufficient payment")
            || normalized.contains("insufficientpayment")
            || normalized.contains("incorrect payment")
        {
            return Self::InsufficientPayment;
        }
        if normalized.contains("not active") || normalized.contains("inactive") {
            return Self::AgentNotActive;
        }
        Self::Message(message.trim().to_string())
    }
}

impl fmt::Display for RevertReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientPayment => write!(f, "insufficient payment"),
            Self::AgentNotActive => write!(f, "agent is not active"),
            Self::Message(message) => write!(f, "{message}"),
            Self::Unknown => write!(f, "transaction reverted without a reason"),
        }
    }
}

/// SentiMarket error types
#[derive(Debug, Clone, Error)]
pub enum MarketError {
    // ========================================================================
    // Wallet Errors
    // ========================================================================

    /// No signing provider is injected
    #[error("No wallet provider is available")]
    ProviderUnavailable,

    /// The provider granted access but returned an empty account list
    #[error("No accounts were authorized by the wallet provider")]
    NoAccountsAuthorized,

    /// The provider rejected or failed a request
    #[error("Wallet provider error: {message}")]
    Provider { message: String },

    // ========================================================================
    // Contract Errors
    // ========================================================================

    /// The contract handle could not be verified as callable
    #[error("Contract binding at {address} failed: {reason}")]
    BindingFailed { address: String, reason: String },

    /// The contract rejected a call
    #[error("Contract call reverted: {reason}")]
    CallReverted { reason: RevertReason },

    /// A read failed in a way that may succeed on retry
    #[error("Transient read failure: {message}")]
    TransientReadFailure { message: String },

    /// An operation needs a `Ready` contract binding
    #[error("Contract is not ready")]
    ContractNotReady,

    // ========================================================================
    // Session Errors
    // ========================================================================

    /// A user-initiated operation is already running on this component
    #[error("Operation {operation} is already in progress")]
    OperationInProgress { operation: &'static str },

    // ========================================================================
    // Input Errors
    // ========================================================================

    /// Amount could not be converted to native units
    #[error("Invalid amount '{input}': {reason}")]
    InvalidAmount { input: String, reason: String },

    /// Address string is not a 20-byte hex address
    #[error("Invalid address '{input}'")]
    InvalidAddress { input: String },

    /// Invalid input
    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    // ========================================================================
    // Transport Errors
    // ========================================================================

    /// JSON-RPC transport or protocol failure
    #[error("RPC {method} failed: {message}")]
    Rpc { method: String, message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl MarketError {
    /// Create a provider error
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }

    /// Create a transient read failure
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientReadFailure {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an RPC error
    pub fn rpc(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rpc {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a revert error from a contract revert string
    pub fn reverted(message: &str) -> Self {
        Self::CallReverted {
            reason: RevertReason::from_message(message),
        }
    }

    /// Check if this is a retriable error
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::TransientReadFailure { .. } | Self::Rpc { .. } | Self::OperationInProgress { .. }
        )
    }

    /// Check if the chain rejected the call for a price mismatch
    pub fn is_insufficient_payment(&self) -> bool {
        matches!(
            self,
            Self::CallReverted {
                reason: RevertReason::InsufficientPayment
            }
        )
    }

    /// Kind of this error, for state records
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ProviderUnavailable => ErrorKind::ProviderUnavailable,
            Self::NoAccountsAuthorized => ErrorKind::NoAccountsAuthorized,
            Self::Provider { .. } => ErrorKind::Provider,
            Self::BindingFailed { .. } => ErrorKind::BindingFailed,
            Self::CallReverted { .. } => ErrorKind::CallReverted,
            Self::TransientReadFailure { .. } => ErrorKind::TransientReadFailure,
            Self::ContractNotReady => ErrorKind::ContractNotReady,
            Self::OperationInProgress { .. } => ErrorKind::OperationInProgress,
            Self::InvalidAmount { .. } | Self::InvalidAddress { .. } | Self::InvalidInput { .. } => {
                ErrorKind::InvalidInput
            }
            Self::Rpc { .. } => ErrorKind::Rpc,
            Self::Config { .. } => ErrorKind::Config,
        }
    }

    /// Get an error code for display and logs
    pub fn error_code(&self) -> &'static str {
        self.kind().code()
    }

    /// Snapshot this error as a state record
    pub fn info(&self) -> ErrorInfo {
        ErrorInfo::new(self.kind(), self.to_string())
    }
}

/// Coarse classification of a recorded error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ProviderUnavailable,
    NoAccountsAuthorized,
    Provider,
    BindingFailed,
    CallReverted,
    TransientReadFailure,
    ContractNotReady,
    OperationInProgress,
    InvalidInput,
    Rpc,
    Config,
}

impl ErrorKind {
    /// Stable upper-case code
    pub fn code(&self) -> &'static str {
        match self {
            Self::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            Self::NoAccountsAuthorized => "NO_ACCOUNTS_AUTHORIZED",
            Self::Provider => "PROVIDER_ERROR",
            Self::BindingFailed => "BINDING_FAILED",
            Self::CallReverted => "CALL_REVERTED",
            Self::TransientReadFailure => "TRANSIENT_READ_FAILURE",
            Self::ContractNotReady => "CONTRACT_NOT_READY",
            Self::OperationInProgress => "OPERATION_IN_PROGRESS",
            Self::InvalidInput => "INVALID_INPUT",
            Self::Rpc => "RPC_ERROR",
            Self::Config => "CONFIG_ERROR",
        }
    }
}

/// A recorded failure attached to session state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

impl From<&MarketError> for ErrorInfo {
    fn from(error: &MarketError) -> Self {
        error.info()
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.code(), self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = MarketError::BindingFailed {
            address: "0x0".to_string(),
            reason: "no code".to_string(),
        };
        assert_eq!(err.error_code(), "BINDING_FAILED");
        assert_eq!(MarketError::ContractNotReady.error_code(), "CONTRACT_NOT_READY");
    }

    #[test]
    fn test_retriable_errors() {
        assert!(MarketError::transient("timeout").is_retriable());
        assert!(!MarketError::ProviderUnavailable.is_retriable());
        assert!(!MarketError::reverted("Insufficient payment").is_retriable());
    }

    #[test]
    fn revert_strings_are_classified() {
        assert_eq!(
            RevertReason::from_message("Insufficient payment"),
            RevertReason::InsufficientPayment
        );
        assert_eq!(
            RevertReason::from_message("Agent not active"),
            RevertReason::AgentNotActive
        );
        assert_eq!(RevertReason::from_message("  "), RevertReason::Unknown);
        assert_eq!(
            RevertReason::from_message("Only owner"),
            RevertReason::Message("Only owner".to_string())
        );
    }

    #[test]
    fn insufficient_payment_is_detected() {
        let err = MarketError::reverted("execution reverted: Insufficient payment");
        assert!(err.is_insufficient_payment());
        assert_eq!(err.info().kind, ErrorKind::CallReverted);
    }
}
