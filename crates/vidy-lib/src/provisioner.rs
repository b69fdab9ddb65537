//! One-time provisioning of the platform resources
//!
//! Ensures the project, the YouTube data source and the four prediction
//! models exist before the service accepts traffic. Every resource is looked
//! up first and created only when absent; a creation that loses a race with
//! another instance ("already exists") falls back to the lookup. Any other
//! failure is returned to the caller and aborts startup.

use crate::catalog;
use crate::health::{components, ComponentHealth, HealthRegistry};
use crate::models::{
    DataSource, DataSourceSpec, ModelHandle, ModelSpec, ModelStatus, PredictionKind, Project,
};
use crate::observability::{ServiceMetrics, StructuredLogger};
use crate::platform::{Platform, PlatformError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Configuration for the training wait
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    /// First delay between training status polls
    pub initial_poll: Duration,
    /// Upper bound for the poll delay
    pub max_poll: Duration,
    /// Maximum time to wait for a single model to finish training
    pub training_timeout: Duration,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            initial_poll: Duration::from_secs(1),
            max_poll: Duration::from_secs(30),
            training_timeout: Duration::from_secs(15 * 60),
        }
    }
}

/// Errors that abort provisioning
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("failed to provision {resource} '{name}': {source}")]
    Platform {
        resource: &'static str,
        name: String,
        #[source]
        source: PlatformError,
    },

    #[error("model '{name}' failed training: {message}")]
    TrainingFailed { name: String, message: String },

    #[error("model '{name}' still {status} after {waited:?}")]
    TrainingTimeout {
        name: String,
        status: String,
        waited: Duration,
    },
}

impl ProvisionError {
    fn platform(resource: &'static str, name: &str, source: PlatformError) -> Self {
        ProvisionError::Platform {
            resource,
            name: name.to_string(),
            source,
        }
    }
}

/// Everything that must exist remotely
#[derive(Debug, Clone)]
pub struct ProvisionPlan {
    pub project: String,
    pub data_source: DataSourceSpec,
    pub models: Vec<(PredictionKind, ModelSpec)>,
}

impl ProvisionPlan {
    /// The service's standard project, YouTube source and four models
    pub fn standard(youtube_api_key: &str, openai_api_key: &str) -> Self {
        Self {
            project: catalog::PROJECT_NAME.to_string(),
            data_source: catalog::youtube_data_source(youtube_api_key),
            models: catalog::model_specs(openai_api_key),
        }
    }
}

/// Trained model for each prediction kind
#[derive(Debug, Clone)]
pub struct ModelSet {
    pub sentiment: ModelHandle,
    pub spam: ModelHandle,
    pub comment_summary: ModelHandle,
    pub recommendation: ModelHandle,
}

impl ModelSet {
    pub fn get(&self, kind: PredictionKind) -> &ModelHandle {
        match kind {
            PredictionKind::Sentiment => &self.sentiment,
            PredictionKind::Spam => &self.spam,
            PredictionKind::CommentSummary => &self.comment_summary,
            PredictionKind::Recommendation => &self.recommendation,
        }
    }
}

/// Handles to every provisioned resource
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub project: Project,
    pub data_source: DataSource,
    pub models: ModelSet,
}

/// Get-or-create provisioner for platform resources
pub struct Provisioner {
    platform: Arc<dyn Platform>,
    config: ProvisionConfig,
    logger: StructuredLogger,
    metrics: ServiceMetrics,
    health: Option<HealthRegistry>,
}

impl Provisioner {
    pub fn new(
        platform: Arc<dyn Platform>,
        config: ProvisionConfig,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            platform,
            config,
            logger,
            metrics: ServiceMetrics::new(),
            health: None,
        }
    }

    /// Report progress on the `provisioner` health component
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    async fn report(&self, health: ComponentHealth) {
        if let Some(registry) = &self.health {
            registry.update(components::PROVISIONER, health).await;
        }
    }

    /// Provision every resource in `plan`, waiting for all models to train
    ///
    /// The `provisioner` component stays degraded while this runs, turns
    /// healthy on success and unhealthy on failure.
    pub async fn provision(&self, plan: &ProvisionPlan) -> Result<Provisioned, ProvisionError> {
        self.report(ComponentHealth::degraded("provisioning platform resources"))
            .await;

        let result = self.provision_all(plan).await;
        match &result {
            Ok(_) => self.report(ComponentHealth::healthy()).await,
            Err(e) => self.report(ComponentHealth::unhealthy(e.to_string())).await,
        }
        result
    }

    async fn provision_all(&self, plan: &ProvisionPlan) -> Result<Provisioned, ProvisionError> {
        let project = self.ensure_project(&plan.project).await?;
        let data_source = self.ensure_data_source(&plan.data_source).await?;

        let mut sentiment = None;
        let mut spam = None;
        let mut comment_summary = None;
        let mut recommendation = None;
        let mut ready = 0;

        for (kind, spec) in &plan.models {
            let model = self.ensure_model(&project.name, spec).await?;
            ready += 1;
            self.metrics.set_models_ready(ready);

            let slot = match kind {
                PredictionKind::Sentiment => &mut sentiment,
                PredictionKind::Spam => &mut spam,
                PredictionKind::CommentSummary => &mut comment_summary,
                PredictionKind::Recommendation => &mut recommendation,
            };
            *slot = Some(model);
        }

        let missing = |kind: PredictionKind| ProvisionError::Platform {
            resource: "model",
            name: kind.as_str().to_string(),
            source: PlatformError::NotFound(format!("no model planned for {}", kind)),
        };

        Ok(Provisioned {
            project,
            data_source,
            models: ModelSet {
                sentiment: sentiment.ok_or_else(|| missing(PredictionKind::Sentiment))?,
                spam: spam.ok_or_else(|| missing(PredictionKind::Spam))?,
                comment_summary: comment_summary
                    .ok_or_else(|| missing(PredictionKind::CommentSummary))?,
                recommendation: recommendation
                    .ok_or_else(|| missing(PredictionKind::Recommendation))?,
            },
        })
    }

    /// Ensure the project exists
    pub async fn ensure_project(&self, name: &str) -> Result<Project, ProvisionError> {
        let err = |e| ProvisionError::platform("project", name, e);

        if let Some(project) = self.platform.find_project(name).await.map_err(err)? {
            self.logger.log_resource("project", name, false);
            return Ok(project);
        }

        match self.platform.create_project(name).await {
            Ok(project) => {
                self.logger.log_resource("project", name, true);
                Ok(project)
            }
            Err(e) if e.is_already_exists() => {
                self.logger.log_resource("project", name, false);
                self.platform
                    .find_project(name)
                    .await
                    .map_err(err)?
                    .ok_or_else(|| err(e))
            }
            Err(e) => Err(err(e)),
        }
    }

    /// Ensure the data source exists
    pub async fn ensure_data_source(
        &self,
        spec: &DataSourceSpec,
    ) -> Result<DataSource, ProvisionError> {
        let err = |e| ProvisionError::platform("data source", &spec.name, e);

        if let Some(source) = self.platform.find_database(&spec.name).await.map_err(err)? {
            self.logger.log_resource("data source", &spec.name, false);
            return Ok(source);
        }

        match self.platform.create_database(spec).await {
            Ok(source) => {
                self.logger.log_resource("data source", &spec.name, true);
                Ok(source)
            }
            Err(e) if e.is_already_exists() => {
                self.logger.log_resource("data source", &spec.name, false);
                self.platform
                    .find_database(&spec.name)
                    .await
                    .map_err(err)?
                    .ok_or_else(|| err(e))
            }
            Err(e) => Err(err(e)),
        }
    }

    /// Ensure a model exists and has finished training
    pub async fn ensure_model(
        &self,
        project: &str,
        spec: &ModelSpec,
    ) -> Result<ModelHandle, ProvisionError> {
        let err = |e| ProvisionError::platform("model", &spec.name, e);

        let model = match self.platform.find_model(project, &spec.name).await.map_err(err)? {
            Some(model) => {
                self.logger.log_resource("model", &spec.name, false);
                model
            }
            None => match self.platform.create_model(project, spec).await {
                Ok(model) => {
                    self.logger.log_resource("model", &spec.name, true);
                    model
                }
                Err(e) if e.is_already_exists() => {
                    self.logger.log_resource("model", &spec.name, false);
                    self.platform
                        .find_model(project, &spec.name)
                        .await
                        .map_err(err)?
                        .ok_or_else(|| err(e))?
                }
                Err(e) => return Err(err(e)),
            },
        };

        self.wait_until_trained(model).await
    }

    /// Poll a model's status with exponential backoff until it is complete
    pub async fn wait_until_trained(
        &self,
        mut model: ModelHandle,
    ) -> Result<ModelHandle, ProvisionError> {
        let started = Instant::now();
        let mut delay = self.config.initial_poll;

        loop {
            match &model.status {
                ModelStatus::Complete => return Ok(model),
                ModelStatus::Error(message) => {
                    return Err(ProvisionError::TrainingFailed {
                        name: model.name.clone(),
                        message: message.clone(),
                    });
                }
                _ => {}
            }

            let waited = started.elapsed();
            if waited >= self.config.training_timeout {
                return Err(ProvisionError::TrainingTimeout {
                    name: model.name.clone(),
                    status: model.status.to_string(),
                    waited,
                });
            }

            self.logger
                .log_model_training(&model.name, &model.status, waited);
            self.report(ComponentHealth::degraded(format!(
                "waiting for model {} ({})",
                model.name, model.status
            )))
            .await;
            tokio::time::sleep(delay.min(self.config.training_timeout - waited)).await;
            delay = (delay * 2).min(self.config.max_poll);

            model.status = self
                .platform
                .model_status(&model.project, &model.name)
                .await
                .map_err(|e| ProvisionError::platform("model", &model.name, e))?;
        }
    }
}
