//! Connector to the hosted ML platform
//!
//! The platform hosts the YouTube data connector and the prediction models.
//! Everything is driven through SQL statements sent over its HTTP API; this
//! module wraps those statements behind the [`Platform`] trait so the
//! provisioner and dispatcher can be exercised against an in-memory fake.

mod http;
pub mod sql;
mod table;

#[cfg(test)]
pub(crate) mod mock;

pub use http::{HttpPlatform, PlatformConfig};
pub use table::Table;

use crate::models::{
    Comment, CommentQuery, DataSource, DataSourceSpec, ModelHandle, ModelSpec, ModelStatus,
    Project,
};
use serde_json::{Map, Value};

pub use async_trait::async_trait;

/// Errors returned by platform operations
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid platform URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("authentication rejected ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("malformed platform response: {0}")]
    MalformedResponse(String),

    #[error("column '{0}' missing from result")]
    MissingColumn(String),
}

impl PlatformError {
    /// Classify an error message returned by the SQL endpoint
    pub fn from_query_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.to_ascii_lowercase().contains("already exists") {
            PlatformError::AlreadyExists(message)
        } else {
            PlatformError::Query(message)
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, PlatformError::AlreadyExists(_))
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;

/// Operations the service needs from the ML platform
#[async_trait]
pub trait Platform: Send + Sync {
    /// Look up a project by name
    async fn find_project(&self, name: &str) -> PlatformResult<Option<Project>>;

    /// Create a project
    async fn create_project(&self, name: &str) -> PlatformResult<Project>;

    /// Look up a data source by name
    async fn find_database(&self, name: &str) -> PlatformResult<Option<DataSource>>;

    /// Create a data source
    async fn create_database(&self, spec: &DataSourceSpec) -> PlatformResult<DataSource>;

    /// Look up a model inside a project
    async fn find_model(&self, project: &str, name: &str) -> PlatformResult<Option<ModelHandle>>;

    /// Create (and start training) a model inside a project
    async fn create_model(&self, project: &str, spec: &ModelSpec) -> PlatformResult<ModelHandle>;

    /// Current training status of a model
    async fn model_status(&self, project: &str, name: &str) -> PlatformResult<ModelStatus>;

    /// Fetch the comments selected by `query`
    async fn fetch_comments(
        &self,
        source: &DataSource,
        query: &CommentQuery,
    ) -> PlatformResult<Vec<Comment>>;

    /// Run `model` over the comment view selected by `query`
    async fn predict_comments(
        &self,
        model: &ModelHandle,
        source: &DataSource,
        query: &CommentQuery,
    ) -> PlatformResult<Table>;

    /// Run `model` over a single row of keyed inputs
    async fn predict_row(
        &self,
        model: &ModelHandle,
        inputs: &Map<String, Value>,
    ) -> PlatformResult<Table>;
}
