//! Traffic steering library for service meshes
//!
//! This crate provides the core functionality for:
//! - Building the service dependency graph from observed traffic
//! - Resolving replicas and enriching them with load and capacity signals
//! - Computing traffic-split plans (even and capacity-aware strategies)
//! - Health checks and observability for the controller

pub mod allocation;
pub mod catalog;
pub mod error;
pub mod graph;
pub mod health;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod telemetry;
pub mod topology;

pub use allocation::AllocationStrategy;
pub use catalog::{CatalogScope, ReplicaCatalog};
pub use error::{ErrorKind, Result, SteerError};
pub use graph::DependencyGraph;
pub use health::{BackendHealth, BackendStatus, HealthRegistry, HealthResponse, ReadinessResponse};
pub use models::*;
pub use observability::{SteerMetrics, StructuredLogger};
pub use pipeline::{Pipeline, PipelineConfig, PlanReport, RunOverrides};
