//! Analysis commands - run a classifier locally and browse the model catalog

use crate::config::AppConfig;
use crate::display;
use sentimarket_inference::{
    catalog, convert_to_sentiment, ClassificationBackend, HuggingFaceProvider, LexiconProvider,
    ModelValidation, SentimentAnalysisService,
};
use std::sync::Arc;

fn service(config: &AppConfig, offline: bool) -> SentimentAnalysisService {
    let backend: Arc<dyn ClassificationBackend> = if offline || config.simulate {
        Arc::new(LexiconProvider::new())
    } else {
        Arc::new(HuggingFaceProvider::new(config.inference.clone()))
    };
    SentimentAnalysisService::new(backend)
}

pub async fn analyze(
    config: &AppConfig,
    text: &str,
    model: Option<&str>,
    offline: bool,
) -> anyhow::Result<()> {
    let service = service(config, offline);
    let model_id = match model {
        Some(key) => catalog::find_model(key)
            .map(|m| m.model_id)
            .unwrap_or_else(|| key.to_string()),
        None => catalog::fallback_model().model_id,
    };

    let output = service.analyze(text, &model_id).await?;
    let (sentiment, confidence) = convert_to_sentiment(&output.predictions);

    if config.json {
        println!(
            "{}",
            serde_json::json!({
                "sentiment": sentiment,
                "confidence": confidence,
                "backend": service.backend_name(),
                "output": output,
            })
        );
    } else {
        display::section(&format!("Sentiment ({})", service.backend_name()));
        display::analysis(&output, sentiment, confidence);
    }
    Ok(())
}

pub async fn models(
    config: &AppConfig,
    use_case: Option<&str>,
    validate: Option<&str>,
) -> anyhow::Result<()> {
    if let Some(model_id) = validate {
        let validation = service(config, false).validate_model(model_id).await;
        if config.json {
            println!("{}", serde_json::to_string_pretty(&validation)?);
        } else {
            match &validation {
                ModelValidation::Valid { model } => {
                    display::success(&format!("{} can be used ({})", model.id, model.task));
                }
                ModelValidation::Invalid { reason } => display::error(reason),
            }
        }
        return Ok(());
    }

    let models = catalog::recommend(use_case);
    if config.json {
        println!("{}", serde_json::to_string_pretty(&models)?);
    } else {
        display::section("Sentiment models");
        display::models(&models);
    }
    Ok(())
}
