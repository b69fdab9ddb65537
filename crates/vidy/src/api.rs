//! HTTP API: comment analysis, health checks and Prometheus metrics

use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{header::CONTENT_TYPE, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use vidy_lib::{
    dispatcher::DEFAULT_COMMENT_LIMIT,
    health::{ComponentStatus, HealthRegistry},
    AnalysisRequest, Dispatcher, PredictionSelection,
};

/// Shared application state
///
/// The dispatcher is installed once provisioning finished; until then the
/// analysis route answers 503 while health and metrics are already served.
pub struct AppState {
    dispatcher: OnceLock<Dispatcher>,
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry) -> Self {
        Self {
            dispatcher: OnceLock::new(),
            health_registry,
        }
    }

    pub fn with_dispatcher(dispatcher: Dispatcher, health_registry: HealthRegistry) -> Self {
        let state = Self::new(health_registry);
        let _ = state.dispatcher.set(dispatcher);
        state
    }

    /// Start serving analysis requests; fails if a dispatcher is already installed
    pub fn install_dispatcher(&self, dispatcher: Dispatcher) -> anyhow::Result<()> {
        self.dispatcher
            .set(dispatcher)
            .map_err(|_| anyhow::anyhow!("dispatcher already installed"))
    }

    pub fn dispatcher(&self) -> Option<&Dispatcher> {
        self.dispatcher.get()
    }
}

/// Query parameters of `GET /api/youtube`
///
/// Prediction flags are enabled only by the literal string `true`.
#[derive(Debug, Deserialize)]
pub struct AnalysisParams {
    pub youtube_video_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    pub sentiment: Option<String>,
    pub spam: Option<String>,
    pub comment_summary: Option<String>,
    pub recommendation: Option<String>,
}

fn default_limit() -> u32 {
    DEFAULT_COMMENT_LIMIT
}

fn flag(value: &Option<String>) -> bool {
    value.as_deref() == Some("true")
}

impl AnalysisParams {
    pub fn selection(&self) -> PredictionSelection {
        PredictionSelection {
            sentiment: flag(&self.sentiment),
            spam: flag(&self.spam),
            comment_summary: flag(&self.comment_summary),
            recommendation: flag(&self.recommendation),
        }
    }

    pub fn into_request(self) -> ApiResult<AnalysisRequest> {
        let selection = self.selection();
        let video_id = self
            .youtube_video_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::BadRequest("youtube_video_id is required".to_string()))?;

        Ok(AnalysisRequest::new(video_id, selection).with_limit(self.limit))
    }
}

/// Analyse the comments of one video
///
/// Returns 502 with the report when every requested prediction failed.
async fn analyze_video(
    State(state): State<Arc<AppState>>,
    params: Result<Query<AnalysisParams>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let request = params.into_request()?;
    let dispatcher = state.dispatcher().ok_or_else(|| {
        ApiError::Unavailable("models are still being provisioned".to_string())
    })?;
    debug!(video_id = %request.video_id, limit = request.limit, "Analysis requested");

    let report = dispatcher.analyze(&request).await;

    let status = if report.all_failed() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };

    Ok((status, Json(report)).into_response())
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once provisioning finished
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> ApiResult<impl IntoResponse> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::Internal(format!("failed to encode metrics: {}", e)))?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    ))
}

/// CORS policy for the browser-facing `/api` routes
pub fn build_cors_layer(origin: &str) -> anyhow::Result<CorsLayer> {
    let origin: HeaderValue = origin
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid CORS origin '{}': {}", origin, e))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET])
        .allow_headers([CONTENT_TYPE]))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    let api = Router::new()
        .route("/youtube", get(analyze_video))
        .layer(cors);

    Router::new()
        .nest("/api", api)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, app: Router) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
