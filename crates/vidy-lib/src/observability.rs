//! Observability infrastructure for the analysis service
//!
//! Provides:
//! - Prometheus metrics (request latency, per-kind prediction latency and errors,
//!   comments fetched, models ready)
//! - Structured JSON logging with tracing

use crate::models::{ModelStatus, PredictionKind};
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

/// Histogram buckets for remote calls (in seconds); model inference is slow
const LATENCY_BUCKETS: &[f64] = &[
    0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ServiceMetricsInner> = OnceLock::new();

struct ServiceMetricsInner {
    request_latency_seconds: Histogram,
    prediction_latency_seconds: HistogramVec,
    prediction_errors: IntCounterVec,
    comments_fetched: IntCounter,
    models_ready: IntGauge,
}

impl ServiceMetricsInner {
    fn new() -> Self {
        Self {
            request_latency_seconds: register_histogram!(
                "vidy_request_latency_seconds",
                "Time spent serving an analysis request",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register request_latency_seconds"),

            prediction_latency_seconds: register_histogram_vec!(
                "vidy_prediction_latency_seconds",
                "Time spent waiting on a remote prediction",
                &["kind"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            prediction_errors: register_int_counter_vec!(
                "vidy_prediction_errors_total",
                "Predictions that failed or timed out",
                &["kind"]
            )
            .expect("Failed to register prediction_errors"),

            comments_fetched: register_int_counter!(
                "vidy_comments_fetched_total",
                "Comments fetched for summary and recommendation prompts"
            )
            .expect("Failed to register comments_fetched"),

            models_ready: register_int_gauge!(
                "vidy_models_ready",
                "Number of provisioned models that finished training"
            )
            .expect("Failed to register models_ready"),
        }
    }
}

/// Service metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct ServiceMetrics {
    _private: (),
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ServiceMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_request_latency(&self, duration_secs: f64) {
        self.inner().request_latency_seconds.observe(duration_secs);
    }

    pub fn observe_prediction_latency(&self, kind: PredictionKind, duration_secs: f64) {
        self.inner()
            .prediction_latency_seconds
            .with_label_values(&[kind.as_str()])
            .observe(duration_secs);
    }

    pub fn inc_prediction_errors(&self, kind: PredictionKind) {
        self.inner()
            .prediction_errors
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    pub fn add_comments_fetched(&self, count: u64) {
        self.inner().comments_fetched.inc_by(count);
    }

    pub fn set_models_ready(&self, count: i64) {
        self.inner().models_ready.set(count);
    }
}

/// Structured logger for service events
///
/// Emits consistently named events so log pipelines can key on `event`.
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_startup(&self, version: &str, platform_url: &str) {
        info!(
            event = "service_started",
            service = %self.service,
            version = %version,
            platform_url = %platform_url,
            "Comment analysis service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Comment analysis service shutting down"
        );
    }

    /// Log a provisioned resource; `created` is false when it already existed
    pub fn log_resource(&self, resource: &str, name: &str, created: bool) {
        info!(
            event = "resource_provisioned",
            service = %self.service,
            resource = %resource,
            name = %name,
            created = created,
            "{} {} {}",
            resource,
            name,
            if created { "created" } else { "already exists" }
        );
    }

    /// Log a training poll while waiting for a model
    pub fn log_model_training(&self, model: &str, status: &ModelStatus, waited: Duration) {
        info!(
            event = "model_training",
            service = %self.service,
            model = %model,
            status = %status,
            waited_secs = waited.as_secs(),
            "Waiting for model training"
        );
    }

    /// Log the outcome of one analysis request
    pub fn log_analysis(
        &self,
        video_id: &str,
        requested: &[PredictionKind],
        failed: &[PredictionKind],
        duration: Duration,
    ) {
        let requested: Vec<&str> = requested.iter().map(|k| k.as_str()).collect();
        let failed: Vec<&str> = failed.iter().map(|k| k.as_str()).collect();

        if failed.is_empty() {
            info!(
                event = "analysis_completed",
                service = %self.service,
                video_id = %video_id,
                requested = ?requested,
                duration_ms = duration.as_millis() as u64,
                "Analysis completed"
            );
        } else {
            warn!(
                event = "analysis_completed",
                service = %self.service,
                video_id = %video_id,
                requested = ?requested,
                failed = ?failed,
                duration_ms = duration.as_millis() as u64,
                "Analysis completed with failed predictions"
            );
        }
    }
}
