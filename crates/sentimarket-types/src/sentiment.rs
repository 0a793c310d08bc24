//! Sentiment labels and results written back by the off-chain worker

use crate::AgentId;
use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalised sentiment label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    /// Map a raw label to a sentiment.
    ///
    /// Covers the label sets of the common text-classification models
    /// (SST-2, twitter-roberta, emotion, 1-5 star ratings). Positive and
    /// negative markers match anywhere in the label; anything unrecognised
    /// is neutral.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        let has = |needle: &str| label.contains(needle);
        if has("pos")
            || matches!(label.as_str(), "joy" | "love" | "optimism" | "label_2")
            || has("4 stars")
            || has("5 stars")
        {
            Self::Positive
        } else if has("neg")
            || matches!(label.as_str(), "anger" | "sadness" | "pessimism" | "label_0")
            || has("1 star")
            || has("2 stars")
        {
            Self::Negative
        } else {
            Self::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A result event emitted by the contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub request_id: U256,
    pub sentiment: Sentiment,
    /// Confidence in percent (0-100)
    pub confidence: u8,
    /// Block timestamp of the event, or the observation time for pushed events
    pub observed_at: DateTime<Utc>,
    pub block_number: Option<u64>,
    pub worker: Option<Address>,
}

impl SentimentResult {
    /// Build a result from raw event fields, clamping confidence to 100
    pub fn from_raw(
        request_id: U256,
        label: &str,
        confidence: U256,
        observed_at: DateTime<Utc>,
    ) -> Self {
        let confidence = u64::try_from(confidence.min(U256::from(100u8))).unwrap_or(100) as u8;
        Self {
            request_id,
            sentiment: Sentiment::from_label(label),
            confidence,
            observed_at,
            block_number: None,
            worker: None,
        }
    }

    pub fn with_block(mut self, block_number: u64) -> Self {
        self.block_number = Some(block_number);
        self
    }

    pub fn with_worker(mut self, worker: Address) -> Self {
        self.worker = Some(worker);
        self
    }
}

/// A sentiment request submitted for an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentRequest {
    pub agent_id: AgentId,
    pub text: String,
    pub payment: U256,
}
