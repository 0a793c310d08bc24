//! Classification backend implementations

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::types::*;

/// A text-classification backend
#[async_trait]
pub trait ClassificationBackend: Send + Sync {
    /// Get the backend name
    fn name(&self) -> &'static str;

    /// Classify `text` with `model_id`, highest-scoring label first
    async fn classify(&self, text: &str, model_id: &str) -> Result<AnalysisOutput>;

    /// Check that `model_id` exists and does text classification
    async fn validate_model(&self, model_id: &str) -> ModelValidation;
}

// ============================================================================
// Hugging Face Inference API
// ============================================================================

/// Configuration for the Hugging Face backend
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Inference endpoint; the model id is appended as a path segment
    pub base_url: String,
    /// Model metadata endpoint used for validation
    pub hub_url: String,
    pub api_key: Option<String>,
    pub max_text_length: usize,
    pub timeout: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("SENTIMARKET_HF_URL")
                .unwrap_or_else(|_| "https://api-inference.huggingface.co/models".to_string()),
            hub_url: std::env::var("SENTIMARKET_HF_HUB_URL")
                .unwrap_or_else(|_| "https://huggingface.co/api/models".to_string()),
            api_key: std::env::var("SENTIMARKET_HF_API_KEY")
                .ok()
                .filter(|key| !key.is_empty()),
            max_text_length: std::env::var("SENTIMARKET_HF_MAX_TEXT")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(10_000),
            timeout: Duration::from_secs(
                std::env::var("SENTIMARKET_HF_TIMEOUT_SECS")
                    .ok()
                    .and_then(|raw| raw.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}

/// Hugging Face hosted inference backend
pub struct HuggingFaceProvider {
    config: InferenceConfig,
    client: reqwest::Client,
}

impl HuggingFaceProvider {
    pub fn new(config: InferenceConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    pub fn from_env() -> Self {
        Self::new(InferenceConfig::default())
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    inputs: &'a str,
    parameters: ClassifyParameters,
}

#[derive(Serialize)]
struct ClassifyParameters {
    return_all_scores: bool,
}

#[derive(Debug, Deserialize)]
struct HubModel {
    id: String,
    #[serde(default)]
    pipeline_tag: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    library_name: Option<String>,
}

#[async_trait]
impl ClassificationBackend for HuggingFaceProvider {
    fn name(&self) -> &'static str {
        "HuggingFace"
    }

    async fn classify(&self, text: &str, model_id: &str) -> Result<AnalysisOutput> {
        let length = text.chars().count();
        if length > self.config.max_text_length {
            return Err(InferenceError::TextTooLong {
                length,
                max: self.config.max_text_length,
            });
        }

        let started = Instant::now();
        let url = format!("{}/{}", self.config.base_url, model_id);
        let mut request = self.client.post(&url).json(&ClassifyRequest {
            inputs: text,
            parameters: ClassifyParameters {
                return_all_scores: true,
            },
        });
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| InferenceError::Network {
            message: e.to_string(),
        })?;

        let status = response.status();
        match status.as_u16() {
            401 => return Err(InferenceError::Unauthorized),
            429 => return Err(InferenceError::RateLimited),
            503 => return Err(InferenceError::ModelLoading),
            _ => {}
        }
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            return Err(InferenceError::RequestFailed {
                message: error_message(&body).unwrap_or_else(|| format!("HTTP {status}")),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| InferenceError::InvalidResponse {
                message: e.to_string(),
            })?;
        let predictions = parse_predictions(&body)?;
        let processing_time_ms = started.elapsed().as_millis() as u64;
        debug!(model = model_id, processing_time_ms, "Classification complete");

        Ok(AnalysisOutput {
            predictions,
            model_used: model_id.to_string(),
            processing_time_ms,
        })
    }

    async fn validate_model(&self, model_id: &str) -> ModelValidation {
        let url = format!("{}/{}", self.config.hub_url, model_id);
        let response = match self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(_) => {
                return ModelValidation::Invalid {
                    reason: format!("Model not found or not accessible: {model_id}"),
                }
            }
            Err(e) => {
                return ModelValidation::Invalid {
                    reason: e.to_string(),
                }
            }
        };
        match response.json::<HubModel>().await {
            Ok(info) => check_model_info(info),
            Err(e) => ModelValidation::Invalid {
                reason: format!("Unreadable model metadata: {e}"),
            },
        }
    }
}

fn error_message(body: &Value) -> Option<String> {
    body.get("error")
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Normalise the response shapes the inference API returns.
///
/// Accepts `[[{label, score}, ..]]`, `[{label, score}, ..]` and a single
/// `{label, score}` object. Labels are lower-cased and the result is sorted
/// by score, highest first.
pub fn parse_predictions(body: &Value) -> Result<Vec<LabelScore>> {
    let entries: Vec<&Value> = match body {
        Value::Array(items) if !items.is_empty() => match &items[0] {
            Value::Array(inner) => inner.iter().collect(),
            _ => items.iter().collect(),
        },
        Value::Object(map) if map.contains_key("label") && map.contains_key("score") => {
            vec![body]
        }
        _ => {
            return Err(InferenceError::InvalidResponse {
                message: "unexpected response format from inference API".to_string(),
            })
        }
    };

    let mut predictions = entries
        .into_iter()
        .map(|entry| {
            let label = match entry.get("label") {
                Some(Value::String(label)) => label.to_lowercase(),
                Some(other) => other.to_string().to_lowercase(),
                None => return Err(invalid_entry("label")),
            };
            let score = entry
                .get("score")
                .and_then(Value::as_f64)
                .ok_or_else(|| invalid_entry("score"))?;
            Ok(LabelScore { label, score })
        })
        .collect::<Result<Vec<_>>>()?;

    predictions.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ok(predictions)
}

fn invalid_entry(field: &str) -> InferenceError {
    InferenceError::InvalidResponse {
        message: format!("prediction without a {field}"),
    }
}

fn check_model_info(info: HubModel) -> ModelValidation {
    let is_classifier = info.pipeline_tag.as_deref() == Some("text-classification")
        || info
            .tags
            .iter()
            .any(|tag| tag == "text-classification" || tag == "sentiment-analysis");
    if !is_classifier {
        return ModelValidation::Invalid {
            reason: "Model is not suitable for text classification/sentiment analysis".to_string(),
        };
    }
    ModelValidation::Valid {
        model: ModelInfo {
            id: info.id,
            task: info
                .pipeline_tag
                .unwrap_or_else(|| "text-classification".to_string()),
            library_name: info.library_name,
        },
    }
}

// ============================================================================
// Lexicon Backend (Offline Fallback)
// ============================================================================

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "excellent", "amazing", "love", "awesome", "happy", "fantastic", "best",
    "wonderful", "nice", "recommend",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "terrible", "awful", "hate", "worst", "poor", "horrible", "sad", "broken", "disappointed",
    "angry", "refund",
];

/// Offline word-list classifier.
///
/// Deterministic, needs no network and no API key; used for simulation and
/// when the hosted API is unavailable. Accuracy is not a goal.
#[derive(Debug, Default)]
pub struct LexiconProvider;

impl LexiconProvider {
    pub fn new() -> Self {
        Self
    }

    fn scores(text: &str) -> Vec<LabelScore> {
        let lowered = text.to_lowercase();
        let words = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty());
        let (mut pos, mut neg) = (0u32, 0u32);
        for word in words {
            if POSITIVE_WORDS.contains(&word) {
                pos += 1;
            } else if NEGATIVE_WORDS.contains(&word) {
                neg += 1;
            }
        }
        let total = f64::from(pos + neg + 1);
        let mut predictions = vec![
            LabelScore {
                label: "positive".to_string(),
                score: f64::from(pos) / total,
            },
            LabelScore {
                label: "negative".to_string(),
                score: f64::from(neg) / total,
            },
            LabelScore {
                label: "neutral".to_string(),
                score: 1.0 / total,
            },
        ];
        predictions.sort_by(|a, b| b.score.total_cmp(&a.score));
        predictions
    }
}

#[async_trait]
impl ClassificationBackend for LexiconProvider {
    fn name(&self) -> &'static str {
        "Lexicon"
    }

    async fn classify(&self, text: &str, model_id: &str) -> Result<AnalysisOutput> {
        Ok(AnalysisOutput {
            predictions: Self::scores(text),
            model_used: model_id.to_string(),
            processing_time_ms: 0,
        })
    }

    async fn validate_model(&self, model_id: &str) -> ModelValidation {
        ModelValidation::Valid {
            model: ModelInfo {
                id: model_id.to_string(),
                task: "text-classification".to_string(),
                library_name: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_nested_array_response() {
        let body = json!([[
            {"label": "NEGATIVE", "score": 0.02},
            {"label": "POSITIVE", "score": 0.98}
        ]]);
        let predictions = parse_predictions(&body).unwrap();
        assert_eq!(predictions[0].label, "positive");
        assert_eq!(predictions[1].label, "negative");
    }

    #[test]
    fn test_parse_flat_and_single_responses() {
        let flat = json!([{"label": "joy", "score": 0.4}, {"label": "anger", "score": 0.6}]);
        assert_eq!(parse_predictions(&flat).unwrap()[0].label, "anger");

        let single = json!({"label": "LABEL_2", "score": 0.9});
        let predictions = parse_predictions(&single).unwrap();
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].label, "label_2");
    }

    #[test]
    fn test_parse_rejects_unexpected_shapes() {
        assert!(parse_predictions(&json!([])).is_err());
        assert!(parse_predictions(&json!({"error": "loading"})).is_err());
        assert!(parse_predictions(&json!([{"label": "x"}])).is_err());
    }

    #[test]
    fn test_model_info_classification_check() {
        let by_pipeline = HubModel {
            id: "a/b".to_string(),
            pipeline_tag: Some("text-classification".to_string()),
            tags: vec![],
            library_name: Some("transformers".to_string()),
        };
        assert!(check_model_info(by_pipeline).is_valid());

        let by_tag = HubModel {
            id: "a/c".to_string(),
            pipeline_tag: None,
            tags: vec!["sentiment-analysis".to_string()],
            library_name: None,
        };
        match check_model_info(by_tag) {
            ModelValidation::Valid { model } => assert_eq!(model.task, "text-classification"),
            other => panic!("unexpected {other:?}"),
        }

        let generator = HubModel {
            id: "gpt2".to_string(),
            pipeline_tag: Some("text-generation".to_string()),
            tags: vec![],
            library_name: None,
        };
        assert!(!check_model_info(generator).is_valid());
    }

    #[tokio::test]
    async fn test_lexicon_scores() {
        let backend = LexiconProvider::new();
        let out = backend.classify("Great product, I love it", "lexicon").await.unwrap();
        assert_eq!(out.top().map(|p| p.label.as_str()), Some("positive"));

        let out = backend.classify("terrible, worst purchase", "lexicon").await.unwrap();
        assert_eq!(out.top().map(|p| p.label.as_str()), Some("negative"));

        let out = backend.classify("it arrived on tuesday", "lexicon").await.unwrap();
        assert_eq!(out.top().map(|p| p.label.as_str()), Some("neutral"));
    }

    #[tokio::test]
    async fn test_text_length_is_checked_before_sending() {
        let backend = HuggingFaceProvider::new(InferenceConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            hub_url: "http://127.0.0.1:9".to_string(),
            api_key: None,
            max_text_length: 5,
            timeout: Duration::from_secs(1),
        });
        assert_eq!(
            backend.classify("too long text", "m").await.unwrap_err(),
            InferenceError::TextTooLong { length: 13, max: 5 }
        );
    }
}
