//! Default model catalog and use-case recommendations

use crate::types::TransformerModel;

fn model(id: &str, name: &str, model_id: &str, description: &str, labels: &[&str]) -> TransformerModel {
    TransformerModel {
        id: id.to_string(),
        name: name.to_string(),
        model_id: model_id.to_string(),
        description: description.to_string(),
        task: "text-classification".to_string(),
        labels: labels.iter().map(|l| l.to_string()).collect(),
    }
}

/// Models known to work for sentiment analysis
pub fn default_models() -> Vec<TransformerModel> {
    vec![
        model(
            "simple-sentiment",
            "Simple Sentiment (Free)",
            "distilbert-base-uncased-finetuned-sst-2-english",
            "Basic sentiment analysis, no authentication required",
            &["negative", "positive"],
        ),
        model(
            "general-sentiment",
            "General Sentiment Analysis",
            "cardiffnlp/twitter-roberta-base-sentiment-latest",
            "General purpose sentiment analysis trained on Twitter data",
            &["negative", "neutral", "positive"],
        ),
        model(
            "financial-sentiment",
            "Financial News Sentiment",
            "mrm8488/distilroberta-finetuned-financial-news-sentiment-analysis",
            "Optimized for financial news and market sentiment",
            &["negative", "neutral", "positive"],
        ),
        model(
            "emotion-analysis",
            "Emotion Detection",
            "j-hartmann/emotion-english-distilroberta-base",
            "Detects emotions: joy, optimism, anger, sadness",
            &[
                "anger", "fear", "joy", "love", "optimism", "pessimism", "sadness", "surprise",
                "trust",
            ],
        ),
        model(
            "review-sentiment",
            "Product Review Sentiment",
            "nlptown/bert-base-multilingual-uncased-sentiment",
            "Specialized for product reviews and ratings",
            &["1 star", "2 stars", "3 stars", "4 stars", "5 stars"],
        ),
    ]
}

/// Model used when an agent does not name one
pub fn fallback_model() -> TransformerModel {
    model(
        "simple-sentiment",
        "Simple Sentiment (Free)",
        "distilbert-base-uncased-finetuned-sst-2-english",
        "Basic sentiment analysis, no authentication required",
        &["negative", "positive"],
    )
}

/// Look a catalog entry up by its short id
pub fn find_model(id: &str) -> Option<TransformerModel> {
    default_models().into_iter().find(|m| m.id == id)
}

/// Catalog entries suited to a use case; everything when none is given
pub fn recommend(use_case: Option<&str>) -> Vec<TransformerModel> {
    let models = default_models();
    let Some(use_case) = use_case else {
        return models;
    };
    let describes = |m: &TransformerModel, word: &str| m.description.to_lowercase().contains(word);
    match use_case.to_lowercase().as_str() {
        "financial" | "finance" | "trading" => {
            models.into_iter().filter(|m| m.id.contains("financial")).collect()
        }
        "social" | "twitter" | "social media" => models
            .into_iter()
            .filter(|m| describes(m, "twitter") || describes(m, "social"))
            .collect(),
        "reviews" | "product" | "ecommerce" => {
            models.into_iter().filter(|m| describes(m, "review")).collect()
        }
        "emotions" | "emotion" => models.into_iter().filter(|m| m.id.contains("emotion")).collect(),
        _ => models.into_iter().filter(|m| m.id.contains("general")).collect(),
    }
}

/// A catalog-shaped entry for a model id outside the catalog
pub fn custom_model(model_id: &str, name: Option<&str>, description: Option<&str>) -> TransformerModel {
    TransformerModel {
        id: format!("custom-{}", model_id.replace('/', "-")),
        name: name.unwrap_or(model_id).to_string(),
        model_id: model_id.to_string(),
        description: description
            .map(str::to_string)
            .unwrap_or_else(|| format!("Custom model: {model_id}")),
        task: "text-classification".to_string(),
        labels: vec!["negative".into(), "neutral".into(), "positive".into()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommendations() {
        assert_eq!(recommend(None).len(), 5);
        let finance = recommend(Some("Trading"));
        assert_eq!(finance.len(), 1);
        assert_eq!(finance[0].id, "financial-sentiment");
        assert_eq!(recommend(Some("twitter"))[0].id, "general-sentiment");
        assert_eq!(recommend(Some("reviews"))[0].id, "review-sentiment");
        assert_eq!(recommend(Some("something else"))[0].id, "general-sentiment");
    }

    #[test]
    fn test_lookup_and_custom() {
        assert!(find_model("emotion-analysis").is_some());
        assert!(find_model("nope").is_none());
        let custom = custom_model("org/model", None, None);
        assert_eq!(custom.id, "custom-org-model");
        assert_eq!(custom.name, "org/model");
        assert_eq!(fallback_model().model_id, default_models()[0].model_id);
    }
}
