//! Core data models for the comment analysis service

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical workspace on the ML platform grouping the models
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
}

/// Connector configuration exposing an external service as tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    pub name: String,
    pub engine: String,
}

/// Parameters needed to create a data source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceSpec {
    pub name: String,
    pub engine: String,
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

/// Definition of a remote prediction model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub engine: String,
    /// Column the model writes its prediction into
    pub predict: String,
    pub options: serde_json::Map<String, serde_json::Value>,
}

/// Training status reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Generating,
    Training,
    Complete,
    Error(String),
    Other(String),
}

impl ModelStatus {
    /// Parse a raw status value, attaching the platform's error text if any
    pub fn parse(raw: &str, error: Option<&str>) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "generating" => ModelStatus::Generating,
            "training" => ModelStatus::Training,
            "complete" => ModelStatus::Complete,
            "error" => ModelStatus::Error(error.unwrap_or("unknown error").to_string()),
            other => ModelStatus::Other(other.to_string()),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, ModelStatus::Complete)
    }

    /// Returns true once training has finished, successfully or not
    pub fn is_terminal(&self) -> bool {
        matches!(self, ModelStatus::Complete | ModelStatus::Error(_))
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelStatus::Generating => write!(f, "generating"),
            ModelStatus::Training => write!(f, "training"),
            ModelStatus::Complete => write!(f, "complete"),
            ModelStatus::Error(msg) => write!(f, "error: {}", msg),
            ModelStatus::Other(raw) => write!(f, "{}", raw),
        }
    }
}

/// Reference to a model that exists on the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelHandle {
    pub project: String,
    pub name: String,
    pub predict: String,
    pub status: ModelStatus,
}

/// A single viewer comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub display_name: String,
    pub username: String,
    pub comment: String,
}

/// Filtered, limited view of the comments of one video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentQuery {
    pub video_id: String,
    pub limit: u32,
}

/// The independent analyses that can be requested for a video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionKind {
    Sentiment,
    Spam,
    CommentSummary,
    Recommendation,
}

impl PredictionKind {
    pub const ALL: [PredictionKind; 4] = [
        PredictionKind::Sentiment,
        PredictionKind::Spam,
        PredictionKind::CommentSummary,
        PredictionKind::Recommendation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionKind::Sentiment => "sentiment",
            PredictionKind::Spam => "spam",
            PredictionKind::CommentSummary => "comment_summary",
            PredictionKind::Recommendation => "recommendation",
        }
    }

    /// Kinds whose model takes the concatenated comment text as input
    pub fn needs_merged_comments(&self) -> bool {
        matches!(
            self,
            PredictionKind::CommentSummary | PredictionKind::Recommendation
        )
    }
}

impl fmt::Display for PredictionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-class sentiment counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentCounts {
    pub positive: u64,
    pub neutral: u64,
    pub negative: u64,
}

impl SentimentCounts {
    pub fn total(&self) -> u64 {
        self.positive + self.neutral + self.negative
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_status_parse() {
        assert_eq!(ModelStatus::parse("complete", None), ModelStatus::Complete);
        assert_eq!(ModelStatus::parse("Training", None), ModelStatus::Training);
        assert_eq!(
            ModelStatus::parse("error", Some("quota exceeded")),
            ModelStatus::Error("quota exceeded".to_string())
        );
        assert_eq!(
            ModelStatus::parse("queued", None),
            ModelStatus::Other("queued".to_string())
        );
    }

    #[test]
    fn test_model_status_terminal() {
        assert!(ModelStatus::Complete.is_terminal());
        assert!(ModelStatus::Error("x".into()).is_terminal());
        assert!(!ModelStatus::Generating.is_terminal());
        assert!(!ModelStatus::Training.is_complete());
    }

    #[test]
    fn test_prediction_kind_serializes_snake_case() {
        let json = serde_json::to_string(&PredictionKind::CommentSummary).unwrap();
        assert_eq!(json, "\"comment_summary\"");
        assert!(PredictionKind::Recommendation.needs_merged_comments());
        assert!(!PredictionKind::Spam.needs_merged_comments());
    }
}
