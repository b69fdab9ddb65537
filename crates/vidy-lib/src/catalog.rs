//! Names and definitions of the remote resources the service relies on

use crate::models::{DataSourceSpec, ModelSpec, PredictionKind};
use serde_json::{json, Map, Value};

/// Project grouping all models of the service
pub const PROJECT_NAME: &str = "vidy";

/// YouTube connector data source
pub const DATA_SOURCE_NAME: &str = "mindsdb_youtube";
pub const DATA_SOURCE_ENGINE: &str = "youtube";

pub const SENTIMENT_MODEL: &str = "sentiment_classifier_model";
pub const SPAM_MODEL: &str = "spam_classifier_model";
pub const SUMMARY_MODEL: &str = "text_summarization_model";
pub const RECOMMENDATION_MODEL: &str = "recommendation_model";

const SUMMARY_PROMPT: &str =
    "provide an informative summary of the comments comments:{{comments}} using full sentences";

const RECOMMENDATION_PROMPT: &str = "Based on the comments from YouTube videos, strictly tell me \
the topic names that a YouTuber can consider to grow their channel. Example: 'Python' if peoples \
are talking about python. comments:{{comments}}";

fn options(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Data source exposing YouTube comments, authenticated with `youtube_api_key`
pub fn youtube_data_source(youtube_api_key: &str) -> DataSourceSpec {
    DataSourceSpec {
        name: DATA_SOURCE_NAME.to_string(),
        engine: DATA_SOURCE_ENGINE.to_string(),
        parameters: options(&[("youtube_api_token", json!(youtube_api_key))]),
    }
}

/// Model answering the given prediction kind
pub fn model_spec(kind: PredictionKind, openai_api_key: &str) -> ModelSpec {
    match kind {
        PredictionKind::Sentiment => ModelSpec {
            name: SENTIMENT_MODEL.to_string(),
            engine: "huggingface".to_string(),
            predict: "sentiment".to_string(),
            options: options(&[
                ("task", json!("text-classification")),
                ("model_name", json!("cardiffnlp/twitter-roberta-base-sentiment")),
                ("input_column", json!("comment")),
                ("labels", json!(["negative", "neutral", "positive"])),
            ]),
        },
        PredictionKind::Spam => ModelSpec {
            name: SPAM_MODEL.to_string(),
            engine: "huggingface".to_string(),
            predict: "spam".to_string(),
            options: options(&[
                ("task", json!("text-classification")),
                ("model_name", json!("mrm8488/bert-tiny-finetuned-sms-spam-detection")),
                ("input_column", json!("comment")),
                ("labels", json!(["false", "true"])),
            ]),
        },
        PredictionKind::CommentSummary => ModelSpec {
            name: SUMMARY_MODEL.to_string(),
            engine: "openai".to_string(),
            predict: "comment_summary".to_string(),
            options: options(&[
                ("prompt_template", json!(SUMMARY_PROMPT)),
                ("api_key", json!(openai_api_key)),
            ]),
        },
        PredictionKind::Recommendation => ModelSpec {
            name: RECOMMENDATION_MODEL.to_string(),
            engine: "openai".to_string(),
            predict: "recommendation".to_string(),
            options: options(&[
                ("prompt_template", json!(RECOMMENDATION_PROMPT)),
                ("api_key", json!(openai_api_key)),
            ]),
        },
    }
}

/// All four model definitions, in provisioning order
pub fn model_specs(openai_api_key: &str) -> Vec<(PredictionKind, ModelSpec)> {
    PredictionKind::ALL
        .iter()
        .map(|kind| (*kind, model_spec(*kind, openai_api_key)))
        .collect()
}
