//! Controller configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use steer_lib::{AllocationStrategy, PipelineConfig};

/// Controller configuration
///
/// Read from an optional `steer.toml` (or the file named by `STEER_CONFIG`),
/// then overridden by `STEER_`-prefixed environment variables. Nested keys
/// use a double underscore, e.g. `STEER_NODE_SPEEDS__WORKER1=4.5`.
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    /// Instance name attached to structured log events
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// Port for the control, health and metrics API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Base URL of the Prometheus-compatible query API
    #[serde(default = "default_prometheus_url")]
    pub prometheus_url: String,

    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Namespace used when a request names none
    #[serde(default = "default_namespace")]
    pub default_namespace: String,

    /// Observation window for rate and increase queries
    #[serde(default = "default_window")]
    pub window_secs: u64,

    #[serde(default)]
    pub strategy: AllocationStrategy,

    #[serde(default = "default_clock_speed")]
    pub default_clock_speed: f64,

    /// Static relative clock speed per node
    #[serde(default)]
    pub node_speeds: BTreeMap<String, f64>,

    /// Snapshots kept per replica in the telemetry history
    #[serde(default = "default_history_retention")]
    pub history_retention: usize,
}

fn default_instance_name() -> String {
    std::env::var("POD_NAME").unwrap_or_else(|_| "steer-controller".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_prometheus_url() -> String {
    "http://prometheus-service.monitoring.svc.cluster.local:8080".to_string()
}

fn default_query_timeout() -> u64 {
    10
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_window() -> u64 {
    60
}

fn default_clock_speed() -> f64 {
    1.0
}

fn default_history_retention() -> usize {
    100
}

impl ControllerConfig {
    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self> {
        let file = std::env::var("STEER_CONFIG").unwrap_or_else(|_| "steer".to_string());
        Self::load_from(&file)
    }

    /// Load with an explicit config file base name (the file is optional)
    pub fn load_from(file: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            .add_source(
                config::Environment::with_prefix("STEER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read configuration sources")?;

        let parsed: Self = config
            .try_deserialize()
            .context("invalid controller configuration")?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.window_secs > 0, "window_secs must be at least 1");
        anyhow::ensure!(
            self.default_clock_speed.is_finite() && self.default_clock_speed > 0.0,
            "default_clock_speed must be positive"
        );
        if let Some((node, speed)) = self
            .node_speeds
            .iter()
            .find(|(_, s)| !(s.is_finite() && **s >= 0.0))
        {
            anyhow::bail!("node speed for `{}` must be non-negative, got {}", node, speed);
        }
        Ok(())
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs.max(1))
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            window_secs: self.window_secs,
            strategy: self.strategy,
            default_clock_speed: self.default_clock_speed,
            node_speeds: self.node_speeds.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_sources() {
        let config = ControllerConfig::load_from("/nonexistent/steer").unwrap();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.window_secs, 60);
        assert_eq!(config.history_retention, 100);
        assert_eq!(config.pipeline_config().strategy, AllocationStrategy::Even);
    }

    #[test]
    fn test_file_values() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("steer.toml"),
            "api_port = 9000\nstrategy = \"capacity-aware\"\nwindow_secs = 30\n\n[node_speeds]\nworker1 = 4.5\nworker2 = 2.5\n",
        )
        .unwrap();

        let base = dir.path().join("steer");
        let config = ControllerConfig::load_from(base.to_str().unwrap()).unwrap();
        assert_eq!(config.api_port, 9000);
        assert_eq!(config.strategy, AllocationStrategy::CapacityAware);
        assert_eq!(config.pipeline_config().window_secs, 30);
        assert_eq!(config.node_speeds["worker2"], 2.5);
    }

    #[test]
    fn test_rejects_zero_window() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("steer.toml"), "window_secs = 0\n").unwrap();

        let result = ControllerConfig::load_from(dir.path().join("steer").to_str().unwrap());
        assert!(result.is_err());
    }
}
