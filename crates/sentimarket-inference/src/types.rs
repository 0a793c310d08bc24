//! Common types for text-classification inference

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while talking to an inference backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    #[error("Unauthorized: an inference API key is required (set SENTIMARKET_HF_API_KEY)")]
    Unauthorized,

    #[error("Rate limited: wait a moment or configure an API key for higher limits")]
    RateLimited,

    #[error("Model is loading: retry in a few seconds")]
    ModelLoading,

    #[error("Text too long: {length} characters, maximum {max}")]
    TextTooLong { length: usize, max: usize },

    #[error("Request failed: {message}")]
    RequestFailed { message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Network error: {message}")]
    Network { message: String },
}

pub type Result<T> = std::result::Result<T, InferenceError>;

/// One ranked label returned by a classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f64,
}

/// Outcome of one classification call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutput {
    /// Lower-cased labels, highest score first
    pub predictions: Vec<LabelScore>,
    pub model_used: String,
    pub processing_time_ms: u64,
}

impl AnalysisOutput {
    pub fn top(&self) -> Option<&LabelScore> {
        self.predictions.first()
    }
}

/// Model metadata returned when a model passes validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub task: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_name: Option<String>,
}

/// Whether a model can be used for sentiment analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelValidation {
    Valid { model: ModelInfo },
    Invalid { reason: String },
}

impl ModelValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

/// A catalog entry describing a classification model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformerModel {
    /// Short catalog key, e.g. `general-sentiment`
    pub id: String,
    pub name: String,
    /// Hub model id, e.g. `cardiffnlp/twitter-roberta-base-sentiment-latest`
    pub model_id: String,
    pub description: String,
    pub task: String,
    pub labels: Vec<String>,
}

/// Percentage split of sentiments over a result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Distribution {
    pub positive: u32,
    pub neutral: u32,
    pub negative: u32,
}

/// Aggregate view over a set of sentiment results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SentimentStatistics {
    pub total: usize,
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
    /// Rounded mean confidence in percent
    pub average_confidence: u32,
    pub distribution: Distribution,
}
