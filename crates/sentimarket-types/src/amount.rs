//! Native-unit amounts with 18-decimal precision
//!
//! Prices and payments travel on-chain as `U256` wei. Users type decimal
//! strings such as `"0.1"`; conversion goes through `rust_decimal` so no
//! floating point is ever involved.

use crate::{MarketError, Result};
use alloy_primitives::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Decimals of the native currency (ROSE/TEST on Sapphire, ETH on localnet)
pub const NATIVE_DECIMALS: u32 = 18;

/// One whole native token in wei
pub fn one_native() -> U256 {
    U256::from(10u64).pow(U256::from(NATIVE_DECIMALS))
}

/// An amount of native currency in its smallest unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NativeAmount(pub U256);

impl NativeAmount {
    /// Zero wei
    pub const ZERO: Self = Self(U256::ZERO);

    /// Wrap a raw wei value
    pub fn from_wei(wei: U256) -> Self {
        Self(wei)
    }

    /// Raw wei value
    pub fn wei(&self) -> U256 {
        self.0
    }

    /// Convert a non-negative decimal into wei.
    ///
    /// Fails when the value is negative or carries more than 18 fractional
    /// digits, since those cannot be represented exactly.
    pub fn from_decimal(value: Decimal) -> Result<Self> {
        let input = value.to_string();
        if value.is_sign_negative() && !value.is_zero() {
            return Err(MarketError::InvalidAmount {
                input,
                reason: "amount cannot be negative".to_string(),
            });
        }
        let normalized = value.normalize();
        let scale = normalized.scale();
        if scale > NATIVE_DECIMALS {
            return Err(MarketError::InvalidAmount {
                input,
                reason: format!("more than {NATIVE_DECIMALS} decimal places"),
            });
        }
        let mantissa = normalized.mantissa().unsigned_abs();
        let factor = U256::from(10u64).pow(U256::from(NATIVE_DECIMALS - scale));
        Ok(Self(U256::from(mantissa) * factor))
    }

    /// Lossy conversion to a decimal, `None` when the value exceeds the
    /// decimal's 96-bit mantissa
    pub fn to_decimal(&self) -> Option<Decimal> {
        let wei: u128 = self.0.try_into().ok()?;
        let wei = i128::try_from(wei).ok()?;
        Decimal::try_from_i128_with_scale(wei, NATIVE_DECIMALS).ok()
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl FromStr for NativeAmount {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self> {
        parse_native(s).map(Self)
    }
}

impl fmt::Display for NativeAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_native(self.0))
    }
}

impl From<U256> for NativeAmount {
    fn from(wei: U256) -> Self {
        Self(wei)
    }
}

/// Parse a human-readable decimal string (e.g. `"0.1"`) into wei.
pub fn parse_native(input: &str) -> Result<U256> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(MarketError::InvalidAmount {
            input: input.to_string(),
            reason: "amount is empty".to_string(),
        });
    }
    let value = Decimal::from_str(trimmed).map_err(|e| MarketError::InvalidAmount {
        input: input.to_string(),
        reason: e.to_string(),
    })?;
    NativeAmount::from_decimal(value).map(|amount| amount.0)
}

/// Format wei as a decimal string, e.g. `200000000000000000` -> `"0.2"`.
///
/// Whole values keep one fractional digit (`"2.0"`).
pub fn format_native(wei: U256) -> String {
    let one = one_native();
    let whole = wei / one;
    let fraction = wei % one;
    if fraction.is_zero() {
        return format!("{whole}.0");
    }
    let digits = format!("{:0>width$}", fraction.to_string(), width = NATIVE_DECIMALS as usize);
    format!("{whole}.{}", digits.trim_end_matches('0'))
}
