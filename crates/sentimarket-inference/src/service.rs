//! Sentiment analysis service
//!
//! Runs an agent's model through a [`ClassificationBackend`] and turns the
//! ranked labels into a [`SentimentResult`]. The backend is passed in, so
//! tests and simulation can use the offline lexicon classifier.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::U256;
use chrono::Utc;
use sentimarket_types::{Agent, Sentiment, SentimentResult};
use tracing::warn;

use crate::catalog;
use crate::providers::ClassificationBackend;
use crate::types::*;

/// Pause between texts in a batch, to stay under rate limits
pub const BATCH_DELAY: Duration = Duration::from_millis(100);

const TEST_TEXT: &str = "This is a test message for sentiment analysis.";

/// Analyses text with agents' configured models
#[derive(Clone)]
pub struct SentimentAnalysisService {
    backend: Arc<dyn ClassificationBackend>,
}

impl SentimentAnalysisService {
    pub fn new(backend: Arc<dyn ClassificationBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Hub model id for an agent, falling back to the default catalog model
    pub fn model_for(agent: &Agent) -> String {
        if agent.model_endpoint.contains("/models/") && !agent.model_id().is_empty() {
            agent.model_id().to_string()
        } else {
            catalog::fallback_model().model_id
        }
    }

    pub async fn analyze(&self, text: &str, model_id: &str) -> Result<AnalysisOutput> {
        self.backend.classify(text, model_id).await
    }

    /// Classify with the agent's model.
    ///
    /// Never fails: a backend error yields a neutral result with zero
    /// confidence.
    pub async fn analyze_with_agent(
        &self,
        agent: &Agent,
        text: &str,
        request_id: U256,
    ) -> SentimentResult {
        let model_id = Self::model_for(agent);
        let (label, confidence) = match self.backend.classify(text, &model_id).await {
            Ok(output) => convert_to_sentiment(&output.predictions),
            Err(err) => {
                warn!(agent_id = agent.id, model = %model_id, error = %err, "Sentiment analysis failed");
                (Sentiment::Neutral, 0)
            }
        };
        SentimentResult {
            request_id,
            sentiment: label,
            confidence,
            observed_at: Utc::now(),
            block_number: None,
            worker: None,
        }
    }

    /// Run the agent's model on a sample text, surfacing backend errors
    pub async fn test_agent_model(&self, agent: &Agent, text: Option<&str>) -> Result<AnalysisOutput> {
        self.backend
            .classify(text.unwrap_or(TEST_TEXT), &Self::model_for(agent))
            .await
    }

    /// Analyse texts one after another with consecutive request ids
    pub async fn batch_analyze(
        &self,
        agent: &Agent,
        texts: &[String],
        starting_request_id: u64,
    ) -> Vec<SentimentResult> {
        let mut results = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            let request_id = U256::from(starting_request_id + i as u64);
            results.push(self.analyze_with_agent(agent, text, request_id).await);
            if i + 1 < texts.len() {
                tokio::time::sleep(BATCH_DELAY).await;
            }
        }
        results
    }

    pub async fn validate_model(&self, model_id: &str) -> ModelValidation {
        self.backend.validate_model(model_id).await
    }
}

/// Top prediction as a sentiment and a rounded percentage
pub fn convert_to_sentiment(predictions: &[LabelScore]) -> (Sentiment, u8) {
    match predictions.first() {
        Some(top) => {
            let confidence = (top.score * 100.0).round().clamp(0.0, 100.0) as u8;
            (Sentiment::from_label(&top.label), confidence)
        }
        None => (Sentiment::Neutral, 0),
    }
}

/// Counts, mean confidence and percentage split over `results`
pub fn calculate_statistics(results: &[SentimentResult]) -> SentimentStatistics {
    if results.is_empty() {
        return SentimentStatistics::default();
    }
    let count = |s: Sentiment| results.iter().filter(|r| r.sentiment == s).count();
    let positive = count(Sentiment::Positive);
    let neutral = count(Sentiment::Neutral);
    let negative = count(Sentiment::Negative);

    let total = results.len();
    let confidence_sum: u64 = results.iter().map(|r| u64::from(r.confidence)).sum();
    let percent = |n: usize| ((n as f64 / total as f64) * 100.0).round() as u32;

    SentimentStatistics {
        total,
        positive,
        neutral,
        negative,
        average_confidence: (confidence_sum as f64 / total as f64).round() as u32,
        distribution: Distribution {
            positive: percent(positive),
            neutral: percent(neutral),
            negative: percent(negative),
        },
    }
}
