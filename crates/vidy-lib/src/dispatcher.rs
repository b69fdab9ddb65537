//! Per-request prediction dispatch
//!
//! Each analysis request runs its selected predictions as a structured task
//! group: one task per prediction kind, all joined under a shared request
//! deadline. Results are collected into a report owned by the request, so
//! concurrent requests never observe each other's results. A failing or
//! timed-out prediction is recorded in the report's `errors` map while the
//! remaining predictions are still returned.

use crate::health::{components, HealthRegistry};
use crate::models::{
    Comment, CommentQuery, DataSource, ModelHandle, PredictionKind, SentimentCounts,
};
use crate::observability::{ServiceMetrics, StructuredLogger};
use crate::platform::{Platform, PlatformError, PlatformResult};
use crate::provisioner::{ModelSet, Provisioned};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{self, JoinSet};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

/// Default number of comments analysed per request
pub const DEFAULT_COMMENT_LIMIT: u32 = 10;

/// Default deadline for all predictions of one request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Longest deadline a request can be given
pub const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Input column of the summary and recommendation models
const MERGED_COMMENTS_INPUT: &str = "comments";

/// Configuration for the dispatcher
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Deadline covering the comment fetch and every prediction of a request
    pub request_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Which predictions a request asks for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionSelection {
    pub sentiment: bool,
    pub spam: bool,
    pub comment_summary: bool,
    pub recommendation: bool,
}

impl PredictionSelection {
    pub fn all() -> Self {
        Self {
            sentiment: true,
            spam: true,
            comment_summary: true,
            recommendation: true,
        }
    }

    pub fn contains(&self, kind: PredictionKind) -> bool {
        match kind {
            PredictionKind::Sentiment => self.sentiment,
            PredictionKind::Spam => self.spam,
            PredictionKind::CommentSummary => self.comment_summary,
            PredictionKind::Recommendation => self.recommendation,
        }
    }

    /// Selected kinds in a stable order
    pub fn kinds(&self) -> Vec<PredictionKind> {
        PredictionKind::ALL
            .into_iter()
            .filter(|kind| self.contains(*kind))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds().is_empty()
    }
}

/// Transient per-request context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub video_id: String,
    pub limit: u32,
    pub selection: PredictionSelection,
}

impl AnalysisRequest {
    pub fn new(video_id: impl Into<String>, selection: PredictionSelection) -> Self {
        Self {
            video_id: video_id.into(),
            limit: DEFAULT_COMMENT_LIMIT,
            selection,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn comment_query(&self) -> CommentQuery {
        CommentQuery {
            video_id: self.video_id.clone(),
            limit: self.limit,
        }
    }
}

/// Aggregated results of one analysis request
///
/// Only the keys of requested and successful predictions are serialized;
/// failed predictions appear under `errors`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiments: Option<SentimentCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spams: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<PredictionKind, String>,
}

impl AnalysisReport {
    fn apply(&mut self, outcome: PredictionOutcome) {
        match outcome {
            PredictionOutcome::Sentiments(counts) => self.sentiments = Some(counts),
            PredictionOutcome::Spams(count) => self.spams = Some(count),
            PredictionOutcome::CommentSummary(text) => self.comment_summary = Some(text),
            PredictionOutcome::Recommendation(text) => self.recommendation = Some(text),
        }
    }

    fn record_failure(&mut self, kind: PredictionKind, message: impl Into<String>) {
        self.errors.insert(kind, message.into());
    }

    pub fn has_result(&self, kind: PredictionKind) -> bool {
        match kind {
            PredictionKind::Sentiment => self.sentiments.is_some(),
            PredictionKind::Spam => self.spams.is_some(),
            PredictionKind::CommentSummary => self.comment_summary.is_some(),
            PredictionKind::Recommendation => self.recommendation.is_some(),
        }
    }

    pub fn failed_kinds(&self) -> Vec<PredictionKind> {
        self.errors.keys().copied().collect()
    }

    /// True when predictions were requested and none of them succeeded
    pub fn all_failed(&self) -> bool {
        !self.errors.is_empty()
            && !PredictionKind::ALL.iter().any(|kind| self.has_result(*kind))
    }
}

/// Result of a single prediction kind
#[derive(Debug, Clone, PartialEq, Eq)]
enum PredictionOutcome {
    Sentiments(SentimentCounts),
    Spams(u64),
    CommentSummary(String),
    Recommendation(String),
}

/// Concatenate comment texts into the prompt input of the text models
pub fn merge_comments(comments: &[Comment]) -> String {
    comments
        .iter()
        .map(|c| c.comment.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

async fn run_prediction(
    platform: &dyn Platform,
    kind: PredictionKind,
    model: &ModelHandle,
    source: &DataSource,
    query: &CommentQuery,
    merged_comments: Option<&str>,
) -> PlatformResult<PredictionOutcome> {
    match kind {
        PredictionKind::Sentiment => {
            let table = platform.predict_comments(model, source, query).await?;
            Ok(PredictionOutcome::Sentiments(SentimentCounts {
                positive: table.count_label(&model.predict, "positive")?,
                neutral: table.count_label(&model.predict, "neutral")?,
                negative: table.count_label(&model.predict, "negative")?,
            }))
        }
        PredictionKind::Spam => {
            let table = platform.predict_comments(model, source, query).await?;
            Ok(PredictionOutcome::Spams(
                table.count_label(&model.predict, "true")?,
            ))
        }
        PredictionKind::CommentSummary | PredictionKind::Recommendation => {
            let mut inputs = Map::new();
            inputs.insert(
                MERGED_COMMENTS_INPUT.to_string(),
                Value::String(merged_comments.unwrap_or_default().to_string()),
            );

            let table = platform.predict_row(model, &inputs).await?;
            let text = table
                .text(0, &model.predict)
                .ok_or_else(|| PlatformError::MissingColumn(model.predict.clone()))?;

            Ok(if kind == PredictionKind::CommentSummary {
                PredictionOutcome::CommentSummary(text)
            } else {
                PredictionOutcome::Recommendation(text)
            })
        }
    }
}

/// Runs the selected predictions for analysis requests
pub struct Dispatcher {
    platform: Arc<dyn Platform>,
    data_source: DataSource,
    models: ModelSet,
    config: DispatchConfig,
    health: HealthRegistry,
    metrics: ServiceMetrics,
    logger: StructuredLogger,
}

impl Dispatcher {
    pub fn new(
        platform: Arc<dyn Platform>,
        provisioned: &Provisioned,
        config: DispatchConfig,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            platform,
            data_source: provisioned.data_source.clone(),
            models: provisioned.models.clone(),
            config,
            health,
            metrics: ServiceMetrics::new(),
            logger,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Run every prediction selected by `request` and collect the results
    pub async fn analyze(&self, request: &AnalysisRequest) -> AnalysisReport {
        let started = Instant::now();
        let deadline = started
            .checked_add(self.config.request_timeout)
            .unwrap_or_else(|| started + MAX_REQUEST_TIMEOUT);
        let mut report = AnalysisReport::default();

        let requested = request.selection.kinds();
        if requested.is_empty() {
            return report;
        }

        let query = request.comment_query();
        let mut kinds = requested.clone();

        let merged_comments = if kinds.iter().any(|k| k.needs_merged_comments()) {
            match self.fetch_merged_comments(&query, deadline).await {
                Ok(merged) => Some(merged),
                Err(message) => {
                    for kind in kinds.iter().filter(|k| k.needs_merged_comments()) {
                        report.record_failure(*kind, message.clone());
                    }
                    kinds.retain(|k| !k.needs_merged_comments());
                    None
                }
            }
        } else {
            None
        };

        let mut tasks = JoinSet::new();
        let mut pending: HashMap<task::Id, PredictionKind> = HashMap::new();

        for kind in kinds {
            let platform = self.platform.clone();
            let model = self.models.get(kind).clone();
            let source = self.data_source.clone();
            let query = query.clone();
            let merged = merged_comments.clone();

            let handle = tasks.spawn(async move {
                let started = Instant::now();
                let result = run_prediction(
                    platform.as_ref(),
                    kind,
                    &model,
                    &source,
                    &query,
                    merged.as_deref(),
                )
                .await;
                (kind, result, started.elapsed())
            });
            pending.insert(handle.id(), kind);
        }

        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((kind, result, elapsed)))) => {
                    pending.retain(|_, pending_kind| *pending_kind != kind);
                    self.metrics
                        .observe_prediction_latency(kind, elapsed.as_secs_f64());
                    match result {
                        Ok(outcome) => {
                            debug!(
                                kind = %kind,
                                elapsed_ms = elapsed.as_millis() as u64,
                                "Prediction finished"
                            );
                            report.apply(outcome);
                        }
                        Err(e) => {
                            warn!(kind = %kind, error = %e, "Prediction failed");
                            report.record_failure(kind, e.to_string());
                        }
                    }
                }
                Ok(Some(Err(join_error))) => {
                    if let Some(kind) = pending.remove(&join_error.id()) {
                        warn!(kind = %kind, error = %join_error, "Prediction task panicked");
                        report.record_failure(kind, "prediction task panicked");
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    tasks.abort_all();
                    break;
                }
            }
        }

        // whatever is still pending was cut off by the deadline
        for kind in pending.into_values() {
            report.record_failure(
                kind,
                format!("timed out after {}s", self.config.request_timeout.as_secs()),
            );
        }

        self.finish(request, &requested, &report, started).await;
        report
    }

    async fn fetch_merged_comments(
        &self,
        query: &CommentQuery,
        deadline: Instant,
    ) -> Result<String, String> {
        let fetched = timeout_at(
            deadline,
            self.platform.fetch_comments(&self.data_source, query),
        )
        .await;

        match fetched {
            Ok(Ok(comments)) => {
                self.metrics.add_comments_fetched(comments.len() as u64);
                Ok(merge_comments(&comments))
            }
            Ok(Err(e)) => Err(format!("failed to fetch comments: {}", e)),
            Err(_) => Err(format!(
                "timed out fetching comments after {}s",
                self.config.request_timeout.as_secs()
            )),
        }
    }

    async fn finish(
        &self,
        request: &AnalysisRequest,
        requested: &[PredictionKind],
        report: &AnalysisReport,
        started: Instant,
    ) {
        let duration = started.elapsed();
        let failed = report.failed_kinds();

        self.metrics.observe_request_latency(duration.as_secs_f64());
        for kind in &failed {
            self.metrics.inc_prediction_errors(*kind);
        }

        if failed.is_empty() {
            self.health.set_healthy(components::PLATFORM).await;
        } else {
            let summary = failed
                .iter()
                .map(|k| format!("{}: {}", k, report.errors[k]))
                .collect::<Vec<_>>()
                .join("; ");
            self.health
                .set_degraded(components::PLATFORM, summary)
                .await;
        }

        self.logger
            .log_analysis(&request.video_id, requested, &failed, duration);
    }
}
