//! End-to-end pipeline tests against in-memory backends

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use steer_lib::health::backends;
use steer_lib::metrics::TelemetryHistory;
use steer_lib::telemetry::{Sample, TelemetrySource};
use steer_lib::topology::TopologyResolver;
use steer_lib::{
    AllocationStrategy, BackendStatus, CatalogScope, HealthRegistry, Pipeline, PipelineConfig,
    ReplicaEndpoint, Result, RunOverrides, SteerError,
};

struct FakeTelemetry {
    edges: Vec<(&'static str, &'static str)>,
    fail: bool,
    queries: AtomicUsize,
}

impl FakeTelemetry {
    fn new(edges: Vec<(&'static str, &'static str)>) -> Self {
        Self {
            edges,
            fail: false,
            queries: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(vec![])
        }
    }
}

fn labelled(pairs: &[(&str, &str)], value: f64) -> Sample {
    Sample::new(
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())),
        value,
    )
}

#[async_trait]
impl TelemetrySource for FakeTelemetry {
    async fn query(&self, expr: &str, _at: DateTime<Utc>) -> Result<Vec<Sample>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SteerError::Telemetry("connection refused".to_string()));
        }

        let samples = if expr.contains(") by (") {
            self.edges
                .iter()
                .map(|&(s, d)| {
                    labelled(
                        &[
                            ("source_canonical_service", s),
                            ("destination_canonical_service", d),
                        ],
                        12.0,
                    )
                })
                .collect()
        } else if expr.contains("node_cpu_frequency_max_hertz") {
            vec![
                labelled(&[("node", "worker1")], 4.5e9),
                labelled(&[("node", "worker2")], 2.5e9),
            ]
        } else if expr.contains("container_cpu_usage_seconds_total") {
            vec![labelled(&[], 0.25)]
        } else if expr.contains("istio_requests_total") {
            vec![labelled(&[], 10.0)]
        } else if expr.contains("istio_request_duration_milliseconds_sum") {
            vec![labelled(&[], 50.0)]
        } else {
            vec![]
        };
        Ok(samples)
    }
}

struct FakeTopology {
    endpoints: Vec<ReplicaEndpoint>,
}

#[async_trait]
impl TopologyResolver for FakeTopology {
    async fn resolve(
        &self,
        _namespace: &str,
        component: Option<&str>,
    ) -> Result<Vec<ReplicaEndpoint>> {
        Ok(self
            .endpoints
            .iter()
            .filter(|e| component.map_or(true, |c| e.component == c))
            .cloned()
            .collect())
    }
}

fn endpoint(component: &str, name: &str, host: &str) -> ReplicaEndpoint {
    ReplicaEndpoint {
        component: component.to_string(),
        name: name.to_string(),
        address: format!("10.1.0.{}", name.len()),
        host: host.to_string(),
        ports: vec![8080],
        cpu_request_millicores: 250,
    }
}

fn shop_topology() -> FakeTopology {
    FakeTopology {
        endpoints: vec![
            endpoint("frontend", "frontend-0", "worker1"),
            endpoint("frontend", "frontend-1", "worker2"),
            endpoint("cart", "cart-0", "worker1"),
            endpoint("cart", "cart-1", "worker2"),
            endpoint("cart", "cart-2", "worker2"),
            endpoint("catalog", "catalog-0", "worker2"),
        ],
    }
}

fn shop_edges() -> Vec<(&'static str, &'static str)> {
    vec![("frontend", "cart"), ("frontend", "catalog"), ("unknown", "cart")]
}

fn pipeline(telemetry: FakeTelemetry, topology: FakeTopology) -> Pipeline {
    Pipeline::new(Arc::new(telemetry), Arc::new(topology), PipelineConfig::default())
}

fn thresholds(report: &steer_lib::PlanReport, src: &str, dst: &str, replica: &str) -> Vec<u8> {
    report
        .plan
        .targets(src, dst, replica)
        .unwrap_or_else(|| panic!("no targets for {} -> {} ({})", src, dst, replica))
        .iter()
        .map(|t| t.threshold)
        .collect()
}

#[tokio::test]
async fn test_even_plan_for_fan_out() {
    let pipeline = pipeline(FakeTelemetry::new(shop_edges()), shop_topology());
    let report = pipeline.run("shop", RunOverrides::default()).await.unwrap();

    assert_eq!(report.strategy, AllocationStrategy::Even);
    assert_eq!(report.graph.len(), 2);
    assert!(report
        .graph
        .iter()
        .all(|e| e.source != "unknown" && e.destination != "unknown"));

    for source in ["frontend-0", "frontend-1"] {
        assert_eq!(thresholds(&report, "frontend", "cart", source), vec![34, 67, 100]);
        assert_eq!(thresholds(&report, "frontend", "catalog", source), vec![100]);
    }
    assert!(report.plan.validate().is_ok());
}

#[tokio::test]
async fn test_report_carries_flow_metrics() {
    let pipeline = pipeline(FakeTelemetry::new(shop_edges()), shop_topology());
    let report = pipeline.run("shop", RunOverrides::default()).await.unwrap();

    let cart = &report.replicas["cart"];
    assert_eq!(cart.len(), 3);
    assert_eq!(cart[0].cpu_utilization, 25);
    assert_eq!(cart[0].request_count, 10);
    assert_eq!(cart[0].request_latency_ms, Some(5));
    assert_eq!(cart[0].clock_speed, 4.5);
    assert_eq!(cart[1].clock_speed, 2.5);

    // frontend receives no traffic from any observed edge
    let frontend = &report.replicas["frontend"];
    assert_eq!(frontend[0].request_count, 0);
    assert_eq!(frontend[0].request_latency_ms, None);
}

#[tokio::test]
async fn test_capacity_aware_plan_is_valid_and_conserves_flow() {
    let pipeline = pipeline(FakeTelemetry::new(shop_edges()), shop_topology());
    let report = pipeline
        .run(
            "shop",
            RunOverrides {
                strategy: Some(AllocationStrategy::CapacityAware),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(report.strategy, AllocationStrategy::CapacityAware);
    assert!(report.plan.validate().is_ok());
    // Propagation order is frontend, catalog, cart; catalog never calls cart
    assert_eq!(thresholds(&report, "frontend", "catalog", "frontend-0"), vec![100]);
    assert!(report.plan.destinations("catalog", "cart").is_none());
    for (source, destinations) in report.plan.routes() {
        for destination in destinations.keys() {
            assert!(report
                .graph
                .iter()
                .any(|e| &e.source == source && &e.destination == destination));
        }
    }
}

#[tokio::test]
async fn test_missing_destination_replicas_skip_only_that_edge() {
    let mut topology = shop_topology();
    topology.endpoints.retain(|e| e.component != "catalog");
    let pipeline = pipeline(FakeTelemetry::new(shop_edges()), topology);

    let report = pipeline.run("shop", RunOverrides::default()).await.unwrap();
    assert!(report.plan.destinations("frontend", "catalog").is_none());
    assert_eq!(thresholds(&report, "frontend", "cart", "frontend-1"), vec![34, 67, 100]);
}

#[tokio::test]
async fn test_capacity_aware_rejects_empty_component() {
    let mut topology = shop_topology();
    topology.endpoints.retain(|e| e.component != "catalog");
    let pipeline = pipeline(FakeTelemetry::new(shop_edges()), topology);

    let err = pipeline
        .run(
            "shop",
            RunOverrides {
                strategy: Some(AllocationStrategy::CapacityAware),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SteerError::EmptyComponent { ref component } if component == "catalog"));
}

#[tokio::test]
async fn test_capacity_aware_rejects_cycles() {
    let telemetry = FakeTelemetry::new(vec![("frontend", "cart"), ("cart", "frontend")]);
    let pipeline = pipeline(telemetry, shop_topology());

    let even = pipeline.run("shop", RunOverrides::default()).await;
    assert!(even.is_ok());

    let err = pipeline
        .run(
            "shop",
            RunOverrides {
                strategy: Some(AllocationStrategy::CapacityAware),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SteerError::CyclicGraph { .. }));
}

#[tokio::test]
async fn test_repeated_runs_are_identical() {
    let pipeline = pipeline(FakeTelemetry::new(shop_edges()), shop_topology());
    for strategy in [AllocationStrategy::Even, AllocationStrategy::CapacityAware] {
        let overrides = RunOverrides {
            strategy: Some(strategy),
            ..Default::default()
        };
        let first = pipeline.run("shop", overrides.clone()).await.unwrap();
        let second = pipeline.run("shop", overrides).await.unwrap();
        assert_eq!(first.plan, second.plan);
        assert_eq!(
            serde_json::to_string(&first.plan).unwrap(),
            serde_json::to_string(&second.plan).unwrap()
        );
    }
}

#[tokio::test]
async fn test_telemetry_failure_aborts_and_degrades_health() {
    let health = HealthRegistry::new();
    health.register(backends::TELEMETRY).await;
    let pipeline = pipeline(FakeTelemetry::failing(), shop_topology()).with_health(health.clone());

    let err = pipeline.run("shop", RunOverrides::default()).await.unwrap_err();
    assert!(matches!(err, SteerError::Telemetry(_)));

    let status = health.health().await;
    assert_eq!(status.backends[backends::TELEMETRY].status, BackendStatus::Degraded);
}

#[tokio::test]
async fn test_zero_window_is_rejected_before_any_query() {
    let telemetry = Arc::new(FakeTelemetry::new(shop_edges()));
    let pipeline = Pipeline::new(
        telemetry.clone(),
        Arc::new(shop_topology()),
        PipelineConfig::default(),
    );

    let err = pipeline
        .run(
            "shop",
            RunOverrides {
                window: Some(std::time::Duration::from_secs(0)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SteerError::InvalidArgument(_)));
    assert_eq!(telemetry.queries.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_history_records_each_run() {
    let pipeline = pipeline(FakeTelemetry::new(shop_edges()), shop_topology());
    let mut history = TelemetryHistory::new(2);

    for _ in 0..3 {
        pipeline
            .run_with_history("shop", RunOverrides::default(), Some(&mut history))
            .await
            .unwrap();
    }

    assert_eq!(history.replica_count(), 6);
    assert_eq!(history.recent("cart-0", 10).len(), 2);
    assert_eq!(history.average_cpu("cart-0", 2), Some(25.0));
}

#[tokio::test]
async fn test_single_component_scope() {
    let pipeline = pipeline(FakeTelemetry::new(shop_edges()), shop_topology());

    let catalog = pipeline
        .replicas("shop", CatalogScope::Component("cart".into()), None)
        .await
        .unwrap();
    assert_eq!(catalog.replica_count(), 3);
    assert_eq!(catalog.get("cart-2").unwrap().request_count, 10);

    let err = pipeline
        .replicas("shop", CatalogScope::Component("payments".into()), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SteerError::UnknownComponent(ref name) if name == "payments"));
}
