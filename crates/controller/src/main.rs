//! Steer Controller - traffic-steering control plane for a service mesh
//!
//! Serves traffic-split plans computed from live mesh telemetry and the
//! cluster topology, along with health and metrics endpoints.

use anyhow::{Context, Result};
use std::sync::Arc;
use steer_controller::{api, config::ControllerConfig};
use steer_lib::{
    health::backends,
    metrics::TelemetryHistory,
    telemetry::{PrometheusClient, PrometheusConfig},
    topology::KubeTopologyResolver,
    HealthRegistry, Pipeline, SteerMetrics, StructuredLogger,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const CONTROLLER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting steer-controller");

    let config = ControllerConfig::load().context("failed to load configuration")?;
    info!(
        instance = %config.instance_name,
        namespace = %config.default_namespace,
        strategy = %config.strategy,
        "Controller configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(backends::TELEMETRY).await;
    health_registry.register(backends::TOPOLOGY).await;

    // Register metric families before the first scrape
    let _metrics = SteerMetrics::new();

    let logger = StructuredLogger::new(&config.instance_name);
    logger.log_startup(CONTROLLER_VERSION, &config.prometheus_url, config.strategy);

    let telemetry = PrometheusClient::new(PrometheusConfig {
        base_url: config.prometheus_url.clone(),
        timeout: config.query_timeout(),
    })
    .context("failed to create telemetry client")?;

    let topology = KubeTopologyResolver::try_default()
        .await
        .context("failed to connect to the Kubernetes API")?;

    let pipeline = Pipeline::new(Arc::new(telemetry), Arc::new(topology), config.pipeline_config())
        .with_health(health_registry.clone())
        .with_logger(logger.clone());

    let app_state = Arc::new(api::AppState::new(
        pipeline,
        health_registry.clone(),
        TelemetryHistory::new(config.history_retention),
        config.default_namespace.clone(),
    ));

    health_registry.set_ready(true).await;

    let server = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = server => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server exited"),
                Ok(Err(e)) => {
                    error!(error = %e, "API server failed");
                    logger.log_shutdown("API server failed");
                    return Err(e);
                }
                Err(e) => {
                    logger.log_shutdown("API server task panicked");
                    return Err(e.into());
                }
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}
