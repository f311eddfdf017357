//! Observability for the traffic-steering engine
//!
//! Prometheus metrics for plan computation and telemetry queries, plus a
//! structured logger that tags every significant event with `event = ...`.

use crate::allocation::AllocationStrategy;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Buckets for telemetry round-trips and plan computation (seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

static GLOBAL_METRICS: OnceLock<SteerMetricsInner> = OnceLock::new();

struct SteerMetricsInner {
    plan_latency_seconds: HistogramVec,
    query_latency_seconds: Histogram,
    query_errors: IntCounter,
    plans_computed: IntCounterVec,
    plan_failures: IntCounter,
    components: IntGauge,
    edges: IntGauge,
    replicas: IntGauge,
}

impl SteerMetricsInner {
    fn new() -> Self {
        Self {
            plan_latency_seconds: register_histogram_vec!(
                "steer_plan_latency_seconds",
                "Time spent computing a traffic-split plan, telemetry included",
                &["strategy"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register plan_latency_seconds"),

            query_latency_seconds: register_histogram!(
                "steer_telemetry_query_latency_seconds",
                "Round-trip time of a single telemetry query",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register telemetry_query_latency_seconds"),

            query_errors: register_int_counter!(
                "steer_telemetry_query_errors_total",
                "Telemetry queries that failed or returned malformed data"
            )
            .expect("Failed to register telemetry_query_errors"),

            plans_computed: register_int_counter_vec!(
                "steer_plans_computed_total",
                "Traffic-split plans computed successfully",
                &["strategy"]
            )
            .expect("Failed to register plans_computed"),

            plan_failures: register_int_counter!(
                "steer_plan_failures_total",
                "Plan computations aborted by an error"
            )
            .expect("Failed to register plan_failures"),

            components: register_int_gauge!(
                "steer_graph_components",
                "Components in the most recent dependency graph"
            )
            .expect("Failed to register graph_components"),

            edges: register_int_gauge!(
                "steer_graph_edges",
                "Edges in the most recent dependency graph"
            )
            .expect("Failed to register graph_edges"),

            replicas: register_int_gauge!(
                "steer_catalog_replicas",
                "Replicas in the most recent replica catalog"
            )
            .expect("Failed to register catalog_replicas"),
        }
    }
}

/// Handle to the process-wide metrics; clones share the same series
#[derive(Clone)]
pub struct SteerMetrics {
    _private: (),
}

impl Default for SteerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SteerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SteerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SteerMetricsInner {
        GLOBAL_METRICS.get_or_init(SteerMetricsInner::new)
    }

    pub fn observe_plan_latency(&self, strategy: AllocationStrategy, duration_secs: f64) {
        self.inner()
            .plan_latency_seconds
            .with_label_values(&[strategy.as_str()])
            .observe(duration_secs);
    }

    pub fn observe_query_latency(&self, duration_secs: f64) {
        self.inner().query_latency_seconds.observe(duration_secs);
    }

    pub fn inc_query_errors(&self) {
        self.inner().query_errors.inc();
    }

    pub fn inc_plans_computed(&self, strategy: AllocationStrategy) {
        self.inner()
            .plans_computed
            .with_label_values(&[strategy.as_str()])
            .inc();
    }

    pub fn inc_plan_failures(&self) {
        self.inner().plan_failures.inc();
    }

    /// Record the shape of the latest graph
    pub fn set_graph_size(&self, components: usize, edges: usize) {
        self.inner().components.set(components as i64);
        self.inner().edges.set(edges as i64);
    }

    pub fn set_replicas(&self, count: usize) {
        self.inner().replicas.set(count as i64);
    }
}

/// Structured logger for controller events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, telemetry_url: &str, strategy: AllocationStrategy) {
        info!(
            event = "controller_started",
            instance = %self.instance,
            version = %version,
            telemetry_url = %telemetry_url,
            default_strategy = %strategy,
            "Traffic-steering controller started"
        );
    }

    pub fn log_graph_built(&self, namespace: &str, components: usize, edges: usize) {
        info!(
            event = "graph_built",
            instance = %self.instance,
            namespace = %namespace,
            components = components,
            edges = edges,
            "Dependency graph built"
        );
    }

    pub fn log_catalog_built(&self, namespace: &str, components: usize, replicas: usize) {
        info!(
            event = "catalog_built",
            instance = %self.instance,
            namespace = %namespace,
            components = components,
            replicas = replicas,
            "Replica catalog built"
        );
    }

    pub fn log_plan_computed(
        &self,
        namespace: &str,
        strategy: AllocationStrategy,
        routes: usize,
        elapsed_ms: u128,
    ) {
        info!(
            event = "plan_computed",
            instance = %self.instance,
            namespace = %namespace,
            strategy = %strategy,
            routes = routes,
            elapsed_ms = elapsed_ms as u64,
            "Traffic-split plan computed"
        );
    }

    pub fn log_plan_failed(&self, namespace: &str, strategy: AllocationStrategy, error: &str) {
        warn!(
            event = "plan_failed",
            instance = %self.instance,
            namespace = %namespace,
            strategy = %strategy,
            error = %error,
            "Traffic-split plan computation failed"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "controller_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Traffic-steering controller shutting down"
        );
    }
}
