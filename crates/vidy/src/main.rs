//! Vidy - YouTube comment analysis service
//!
//! Serves health and metrics right away, provisions the ML platform
//! resources, then starts answering `GET /api/youtube`.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vidy::{
    api,
    config::{Credentials, ServiceConfig},
};
use vidy_lib::{
    health::{components, HealthRegistry},
    Dispatcher, HttpPlatform, Platform, ProvisionPlan, Provisioner, StructuredLogger,
};

const SERVICE_NAME: &str = "vidy";
const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = ServiceConfig::load().context("failed to load service settings")?;
    let credentials = Credentials::from_env()?;
    let cors = api::build_cors_layer(&config.cors_origin)?;

    let health_registry = HealthRegistry::new();
    health_registry.register(components::PLATFORM).await;
    health_registry.register(components::PROVISIONER).await;

    let logger = StructuredLogger::new(SERVICE_NAME);
    logger.log_startup(SERVICE_VERSION, &config.platform_url);

    let app_state = Arc::new(api::AppState::new(health_registry.clone()));
    let app = api::create_router(app_state.clone(), cors);
    let mut server = tokio::spawn(api::serve(config.api_port, app));

    tokio::select! {
        result = start_analysis(&config, &credentials, &app_state, &logger) => {
            result?;
            health_registry.set_ready(true).await;
        }
        result = &mut server => {
            result.context("API server task failed")??;
            logger.log_shutdown("API server stopped during provisioning");
            return Ok(());
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received during provisioning");
            return Ok(());
        }
    }

    tokio::select! {
        result = &mut server => {
            result.context("API server task failed")??;
            logger.log_shutdown("API server stopped");
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}

/// Log in, provision every resource and start serving analysis requests
async fn start_analysis(
    config: &ServiceConfig,
    credentials: &Credentials,
    state: &api::AppState,
    logger: &StructuredLogger,
) -> Result<()> {
    let health_registry = &state.health_registry;

    let platform = match HttpPlatform::connect(config.platform_config(credentials)).await {
        Ok(platform) => platform,
        Err(e) => {
            health_registry
                .set_unhealthy(components::PLATFORM, e.to_string())
                .await;
            return Err(e).context("failed to log in to the ML platform");
        }
    };
    let platform: Arc<dyn Platform> = Arc::new(platform);

    let plan = ProvisionPlan::standard(&credentials.youtube_api_key, &credentials.openai_api_key);
    let provisioned = Provisioner::new(platform.clone(), config.provision_config(), logger.clone())
        .with_health(health_registry.clone())
        .provision(&plan)
        .await
        .context("failed to provision platform resources")?;
    info!(
        project = %provisioned.project.name,
        data_source = %provisioned.data_source.name,
        "Platform resources ready"
    );

    state.install_dispatcher(Dispatcher::new(
        platform,
        &provisioned,
        config.dispatch_config(),
        health_registry.clone(),
        logger.clone(),
    ))
}
