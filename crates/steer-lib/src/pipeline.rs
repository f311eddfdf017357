//! End-to-end plan computation
//!
//! graph -> catalog -> flow metrics -> allocation -> plan validation.
//! Every run starts from a fresh snapshot and shares no mutable state with
//! other runs; any failure aborts the run without a partial plan.

use crate::allocation::{self, AllocationStrategy};
use crate::catalog::{CatalogScope, ReplicaCatalog};
use crate::error::{Result, SteerError};
use crate::graph::{DependencyEdge, DependencyGraph};
use crate::health::{backends, HealthRegistry};
use crate::metrics::{FlowMetricsAggregator, TelemetryHistory, DEFAULT_CLOCK_SPEED};
use crate::models::{Replica, TrafficSplitPlan};
use crate::observability::{SteerMetrics, StructuredLogger};
use crate::telemetry::TelemetrySource;
use crate::topology::TopologyResolver;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Observation window for rate and increase queries
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    #[serde(default)]
    pub strategy: AllocationStrategy,

    /// Relative speed for hosts without an override or gauge value
    #[serde(default = "default_clock_speed")]
    pub default_clock_speed: f64,

    /// Static relative speed per node name
    #[serde(default)]
    pub node_speeds: BTreeMap<String, f64>,
}

fn default_window_secs() -> u64 {
    60
}

fn default_clock_speed() -> f64 {
    DEFAULT_CLOCK_SPEED
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            strategy: AllocationStrategy::default(),
            default_clock_speed: default_clock_speed(),
            node_speeds: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Per-request adjustments to the configured defaults
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub window: Option<Duration>,
    pub strategy: Option<AllocationStrategy>,
}

/// Everything one run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanReport {
    pub namespace: String,
    pub strategy: AllocationStrategy,
    pub generated_at: DateTime<Utc>,
    pub window_secs: u64,
    pub graph: Vec<DependencyEdge>,
    pub replicas: BTreeMap<String, Vec<Replica>>,
    pub plan: TrafficSplitPlan,
}

pub struct Pipeline {
    telemetry: Arc<dyn TelemetrySource>,
    topology: Arc<dyn TopologyResolver>,
    config: PipelineConfig,
    metrics: SteerMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl Pipeline {
    pub fn new(
        telemetry: Arc<dyn TelemetrySource>,
        topology: Arc<dyn TopologyResolver>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            telemetry,
            topology,
            config,
            metrics: SteerMetrics::new(),
            logger: StructuredLogger::new("steer"),
            health: None,
        }
    }

    /// Report backend outcomes to a health registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn resolve_window(&self, window: Option<Duration>) -> Result<Duration> {
        let window = window.unwrap_or_else(|| self.config.window());
        if window.as_secs() == 0 {
            return Err(SteerError::InvalidArgument(
                "observation window must be at least one second".to_string(),
            ));
        }
        Ok(window)
    }

    async fn track<T>(&self, backend: &str, result: Result<T>) -> Result<T> {
        if let Some(health) = &self.health {
            match &result {
                Ok(_) => health.record_success(backend).await,
                Err(e) => {
                    if let Some(failed) = failing_backend(e) {
                        health.record_failure(failed, e.to_string()).await;
                    }
                }
            }
        }
        result
    }

    /// Build the dependency graph of a namespace
    pub async fn graph(&self, namespace: &str, window: Option<Duration>) -> Result<DependencyGraph> {
        let window = self.resolve_window(window)?;
        let graph = self
            .track(
                backends::TELEMETRY,
                DependencyGraph::observe(self.telemetry.as_ref(), namespace, window).await,
            )
            .await?;

        self.metrics
            .set_graph_size(graph.component_count(), graph.edge_count());
        self.logger
            .log_graph_built(namespace, graph.component_count(), graph.edge_count());
        Ok(graph)
    }

    async fn catalog(
        &self,
        namespace: &str,
        scope: CatalogScope,
        graph: &DependencyGraph,
        window: Duration,
        at: DateTime<Utc>,
        history: Option<&mut TelemetryHistory>,
    ) -> Result<ReplicaCatalog> {
        let mut catalog = self
            .track(
                backends::TOPOLOGY,
                ReplicaCatalog::build(self.topology.as_ref(), namespace, scope.clone()).await,
            )
            .await?;
        if let CatalogScope::Component(name) = scope {
            if catalog.is_empty() {
                return Err(SteerError::UnknownComponent(name));
            }
        }

        let aggregator = FlowMetricsAggregator::new(self.telemetry.as_ref(), namespace, window)
            .at(at)
            .with_node_speeds(self.config.node_speeds.clone(), self.config.default_clock_speed);
        let collected = aggregator.collect_all(graph, &mut catalog, history).await;
        self.track(backends::TELEMETRY, collected).await?;

        self.metrics.set_replicas(catalog.replica_count());
        self.logger.log_catalog_built(
            namespace,
            catalog.components().count(),
            catalog.replica_count(),
        );
        Ok(catalog)
    }

    /// Resolve and annotate the replicas in scope
    ///
    /// A single-component scope that resolves to nothing is an unknown component.
    pub async fn replicas(
        &self,
        namespace: &str,
        scope: CatalogScope,
        window: Option<Duration>,
    ) -> Result<ReplicaCatalog> {
        let window = self.resolve_window(window)?;
        let graph = self.graph(namespace, Some(window)).await?;
        self.catalog(namespace, scope, &graph, window, Utc::now(), None)
            .await
    }

    /// Compute a traffic-split plan for a namespace
    pub async fn run(&self, namespace: &str, overrides: RunOverrides) -> Result<PlanReport> {
        self.run_with_history(namespace, overrides, None).await
    }

    /// Like [`Self::run`], recording every replica's signals into `history`
    pub async fn run_with_history(
        &self,
        namespace: &str,
        overrides: RunOverrides,
        history: Option<&mut TelemetryHistory>,
    ) -> Result<PlanReport> {
        let strategy = overrides.strategy.unwrap_or(self.config.strategy);
        let start = Instant::now();

        let result = self.compute(namespace, strategy, overrides.window, history).await;
        let elapsed = start.elapsed();
        self.metrics
            .observe_plan_latency(strategy, elapsed.as_secs_f64());

        match &result {
            Ok(report) => {
                self.metrics.inc_plans_computed(strategy);
                self.logger.log_plan_computed(
                    namespace,
                    strategy,
                    report.plan.len(),
                    elapsed.as_millis(),
                );
            }
            Err(e) => {
                self.metrics.inc_plan_failures();
                self.logger.log_plan_failed(namespace, strategy, &e.to_string());
            }
        }
        result
    }

    async fn compute(
        &self,
        namespace: &str,
        strategy: AllocationStrategy,
        window: Option<Duration>,
        history: Option<&mut TelemetryHistory>,
    ) -> Result<PlanReport> {
        let window = self.resolve_window(window)?;
        let generated_at = Utc::now();

        let graph = self.graph(namespace, Some(window)).await?;
        let catalog = self
            .catalog(
                namespace,
                CatalogScope::Namespace,
                &graph,
                window,
                generated_at,
                history,
            )
            .await?;

        debug!(namespace = %namespace, strategy = %strategy, "Running allocation");
        let plan = allocation::allocate(strategy, &graph, &catalog)?;

        Ok(PlanReport {
            namespace: namespace.to_string(),
            strategy,
            generated_at,
            window_secs: window.as_secs(),
            graph: graph.edges(),
            replicas: catalog.to_map(),
            plan,
        })
    }
}

/// Backend to blame for an upstream failure
fn failing_backend(error: &SteerError) -> Option<&'static str> {
    match error {
        SteerError::Topology { .. } => Some(backends::TOPOLOGY),
        SteerError::Telemetry(_) | SteerError::MalformedTelemetry { .. } => Some(backends::TELEMETRY),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failing_backend() {
        assert_eq!(
            failing_backend(&SteerError::Telemetry("down".into())),
            Some(backends::TELEMETRY)
        );
        assert_eq!(
            failing_backend(&SteerError::Topology {
                namespace: "shop".into(),
                reason: "forbidden".into()
            }),
            Some(backends::TOPOLOGY)
        );
        assert_eq!(failing_backend(&SteerError::UnknownComponent("x".into())), None);
    }

    #[test]
    fn test_config_defaults() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.window_secs, 60);
        assert_eq!(config.strategy, AllocationStrategy::Even);
        assert_eq!(config.default_clock_speed, 1.0);
        assert!(config.node_speeds.is_empty());
    }

    #[test]
    fn test_config_strategy_and_speeds() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"strategy":"capacity-aware","window_secs":30,"node_speeds":{"worker1":4.5}}"#,
        )
        .unwrap();
        assert_eq!(config.strategy, AllocationStrategy::CapacityAware);
        assert_eq!(config.window(), Duration::from_secs(30));
        assert_eq!(config.node_speeds["worker1"], 4.5);
    }
}
