//! Health tracking for the controller's backends
//!
//! The telemetry backend and the topology resolver are the two external
//! dependencies a plan needs. Each failure degrades the backend; enough
//! consecutive failures mark it unhealthy and pull the controller out of
//! readiness until a call succeeds again.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Consecutive failures after which a backend is considered down
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Health status of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendHealth {
    pub status: BackendStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub last_check_timestamp: i64,
}

impl BackendHealth {
    fn healthy() -> Self {
        Self {
            status: BackendStatus::Healthy,
            last_error: None,
            consecutive_failures: 0,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    fn failed(previous: Option<&BackendHealth>, error: String, threshold: u32) -> Self {
        let consecutive_failures = previous.map_or(0, |h| h.consecutive_failures) + 1;
        let status = if consecutive_failures >= threshold {
            BackendStatus::Unhealthy
        } else {
            BackendStatus::Degraded
        };
        Self {
            status,
            last_error: Some(error),
            consecutive_failures,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: BackendStatus,
    pub backends: BTreeMap<String, BackendHealth>,
}

impl HealthResponse {
    /// Worst status across backends
    pub fn compute_status(backends: &BTreeMap<String, BackendHealth>) -> BackendStatus {
        backends
            .values()
            .map(|h| h.status)
            .fold(BackendStatus::Healthy, |worst, status| match (worst, status) {
                (BackendStatus::Unhealthy, _) | (_, BackendStatus::Unhealthy) => {
                    BackendStatus::Unhealthy
                }
                (BackendStatus::Degraded, _) | (_, BackendStatus::Degraded) => {
                    BackendStatus::Degraded
                }
                _ => BackendStatus::Healthy,
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Backend names for health tracking
pub mod backends {
    pub const TELEMETRY: &str = "telemetry";
    pub const TOPOLOGY: &str = "topology";
}

#[derive(Debug, Clone)]
pub struct HealthRegistry {
    backends: Arc<RwLock<BTreeMap<String, BackendHealth>>>,
    ready: Arc<RwLock<bool>>,
    failure_threshold: u32,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_FAILURE_THRESHOLD)
    }

    pub fn with_threshold(failure_threshold: u32) -> Self {
        Self {
            backends: Arc::new(RwLock::new(BTreeMap::new())),
            ready: Arc::new(RwLock::new(false)),
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// Register a backend as healthy
    pub async fn register(&self, name: &str) {
        self.backends
            .write()
            .await
            .insert(name.to_string(), BackendHealth::healthy());
    }

    pub async fn record_success(&self, name: &str) {
        self.backends
            .write()
            .await
            .insert(name.to_string(), BackendHealth::healthy());
    }

    pub async fn record_failure(&self, name: &str, error: impl Into<String>) {
        let mut backends = self.backends.write().await;
        let next = BackendHealth::failed(backends.get(name), error.into(), self.failure_threshold);
        backends.insert(name.to_string(), next);
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let backends = self.backends.read().await.clone();
        let status = HealthResponse::compute_status(&backends);
        HealthResponse { status, backends }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        if !*self.ready.read().await {
            return ReadinessResponse {
                ready: false,
                reason: Some("Controller not yet initialized".to_string()),
            };
        }

        let health = self.health().await;
        let down: Vec<&str> = health
            .backends
            .iter()
            .filter(|(_, h)| h.status == BackendStatus::Unhealthy)
            .map(|(name, _)| name.as_str())
            .collect();

        if down.is_empty() {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        } else {
            ReadinessResponse {
                ready: false,
                reason: Some(format!("Backend unavailable: {}", down.join(", "))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_registry_is_healthy() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;
        assert_eq!(health.status, BackendStatus::Healthy);
        assert!(health.backends.is_empty());
    }

    #[tokio::test]
    async fn test_single_failure_degrades() {
        let registry = HealthRegistry::new();
        registry.register(backends::TELEMETRY).await;
        registry.register(backends::TOPOLOGY).await;
        registry.record_failure(backends::TELEMETRY, "timeout").await;

        let health = registry.health().await;
        assert_eq!(health.status, BackendStatus::Degraded);
        assert_eq!(health.backends[backends::TELEMETRY].consecutive_failures, 1);
        assert_eq!(
            health.backends[backends::TELEMETRY].last_error.as_deref(),
            Some("timeout")
        );
    }

    #[tokio::test]
    async fn test_repeated_failures_mark_unhealthy_and_unready() {
        let registry = HealthRegistry::with_threshold(2);
        registry.register(backends::TOPOLOGY).await;
        registry.set_ready(true).await;

        registry.record_failure(backends::TOPOLOGY, "forbidden").await;
        assert!(registry.readiness().await.ready);

        registry.record_failure(backends::TOPOLOGY, "forbidden").await;
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert!(readiness.reason.unwrap().contains("topology"));
    }

    #[tokio::test]
    async fn test_success_resets_failures() {
        let registry = HealthRegistry::with_threshold(1);
        registry.record_failure(backends::TELEMETRY, "down").await;
        assert_eq!(registry.health().await.status, BackendStatus::Unhealthy);

        registry.record_success(backends::TELEMETRY).await;
        let health = registry.health().await;
        assert_eq!(health.status, BackendStatus::Healthy);
        assert_eq!(health.backends[backends::TELEMETRY].consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_not_ready_before_initialization() {
        let registry = HealthRegistry::new();
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert!(readiness.reason.is_some());
    }
}
