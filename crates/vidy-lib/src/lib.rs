//! Core library for the YouTube comment analysis service
//!
//! This crate provides:
//! - A client for the SQL-over-HTTP ML platform
//! - The catalog of the project, data source and models the service needs
//! - Idempotent provisioning with a bounded training wait
//! - Per-request prediction dispatch
//! - Health checks and observability

pub mod catalog;
pub mod dispatcher;
pub mod health;
pub mod models;
pub mod observability;
pub mod platform;
pub mod provisioner;

pub use dispatcher::{
    AnalysisReport, AnalysisRequest, DispatchConfig, Dispatcher, PredictionSelection,
};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ServiceMetrics, StructuredLogger};
pub use platform::{HttpPlatform, Platform, PlatformConfig, PlatformError, Table};
pub use provisioner::{ProvisionConfig, ProvisionError, ProvisionPlan, Provisioned, Provisioner};
