//! HTTP API: steering endpoints, health checks and Prometheus metrics

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use steer_lib::{
    catalog::NamingStyle,
    graph::DependencyEdge,
    metrics::{ReplicaSnapshot, TelemetryHistory},
    AllocationStrategy, BackendStatus, CatalogScope, ErrorKind, HealthRegistry, Pipeline,
    RunOverrides, SteerError,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Snapshots returned by the history endpoint when `last` is not given
const DEFAULT_HISTORY_DEPTH: usize = 10;

/// Shared application state
pub struct AppState {
    pub pipeline: Pipeline,
    pub health_registry: HealthRegistry,
    pub history: Mutex<TelemetryHistory>,
    pub default_namespace: String,
}

impl AppState {
    pub fn new(
        pipeline: Pipeline,
        health_registry: HealthRegistry,
        history: TelemetryHistory,
        default_namespace: impl Into<String>,
    ) -> Self {
        Self {
            pipeline,
            health_registry,
            history: Mutex::new(history),
            default_namespace: default_namespace.into(),
        }
    }

    fn namespace<'a>(&'a self, requested: &'a Option<String>) -> &'a str {
        requested.as_deref().unwrap_or(&self.default_namespace)
    }
}

/// JSON error body: `{"error": ..., "kind": ...}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

pub struct ApiError(SteerError);

impl From<SteerError> for ApiError {
    fn from(err: SteerError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match self.0.kind() {
            ErrorKind::Input => (StatusCode::BAD_REQUEST, "input"),
            ErrorKind::Precondition => (StatusCode::UNPROCESSABLE_ENTITY, "precondition"),
            ErrorKind::Upstream => (StatusCode::BAD_GATEWAY, "upstream"),
        };
        warn!(status = %status, error = %self.0, "Request failed");
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
                kind: kind.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Health check response - 200 while operational, 503 once a backend is down
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        BackendStatus::Healthy | BackendStatus::Degraded => StatusCode::OK,
        BackendStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct GraphParams {
    pub namespace: Option<String>,
    pub window: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GraphResponse {
    pub namespace: String,
    pub components: Vec<String>,
    pub edges: Vec<DependencyEdge>,
    /// Topological order, absent when the graph has a cycle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<String>>,
}

async fn graph(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GraphParams>,
) -> ApiResult<Json<GraphResponse>> {
    let namespace = state.namespace(&params.namespace);
    let graph = state
        .pipeline
        .graph(namespace, params.window.map(Duration::from_secs))
        .await?;

    let mut components: Vec<String> = graph.components().map(str::to_string).collect();
    components.sort();

    Ok(Json(GraphResponse {
        namespace: namespace.to_string(),
        components,
        edges: graph.edges(),
        order: graph.topological_order().ok(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReplicaParams {
    pub namespace: Option<String>,
    pub window: Option<u64>,
    pub component: Option<String>,
    pub naming: Option<String>,
}

async fn replicas(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReplicaParams>,
) -> ApiResult<Response> {
    let naming: NamingStyle = params
        .naming
        .as_deref()
        .map(str::parse::<NamingStyle>)
        .transpose()?
        .unwrap_or_default();
    let scope = match params.component {
        Some(component) => CatalogScope::Component(component),
        None => CatalogScope::Namespace,
    };

    let namespace = state.namespace(&params.namespace);
    let catalog = state
        .pipeline
        .replicas(namespace, scope, params.window.map(Duration::from_secs))
        .await?;

    Ok(Json(catalog.view(naming)).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct PlanParams {
    pub namespace: Option<String>,
    pub window: Option<u64>,
    pub strategy: Option<String>,
}

async fn plan(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PlanParams>,
) -> ApiResult<Response> {
    let strategy = params
        .strategy
        .as_deref()
        .map(str::parse::<AllocationStrategy>)
        .transpose()?;
    let namespace = state.namespace(&params.namespace);

    let report = state
        .pipeline
        .run(
            namespace,
            RunOverrides {
                window: params.window.map(Duration::from_secs),
                strategy,
            },
        )
        .await?;

    {
        let mut history = state.history.lock().await;
        for replica in report.replicas.values().flatten() {
            history.record(replica, report.generated_at);
        }
    }

    Ok(Json(report).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub last: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub replica: String,
    pub snapshots: Vec<ReplicaSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_cpu: Option<f64>,
}

async fn history(
    State(state): State<Arc<AppState>>,
    Path(replica): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Response {
    let last = params.last.unwrap_or(DEFAULT_HISTORY_DEPTH);
    let history = state.history.lock().await;
    let snapshots: Vec<ReplicaSnapshot> = history
        .recent(&replica, last)
        .into_iter()
        .cloned()
        .collect();

    if snapshots.is_empty() {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: format!("no telemetry history for replica `{}`", replica),
                kind: "not_found".to_string(),
            }),
        )
            .into_response();
    }

    let average_cpu = history.average_cpu(&replica, last);
    Json(HistoryResponse {
        replica,
        snapshots,
        average_cpu,
    })
    .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/graph", get(graph))
        .route("/api/v1/replicas", get(replicas))
        .route("/api/v1/plan", get(plan))
        .route("/api/v1/history/:replica", get(history))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
