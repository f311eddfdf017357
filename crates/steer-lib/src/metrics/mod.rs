//! Flow metrics aggregation
//!
//! Derives the per-replica load and capacity signals the allocation engine
//! consumes. Each collector is independent and returns a map keyed by
//! replica name (node speeds are keyed by host); [`FlowMetricsAggregator::collect_all`]
//! runs them in sequence and writes the results into the catalog.

mod history;

pub use history::{ReplicaSnapshot, TelemetryHistory};

use crate::catalog::ReplicaCatalog;
use crate::error::Result;
use crate::graph::DependencyGraph;
use crate::telemetry::{queries, round_units, sum_values, TelemetrySource};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, info};

/// Hertz per GHz; node speeds are expressed in GHz
const HZ_PER_GHZ: f64 = 1e9;

/// Relative speed used for hosts with neither an override nor a gauge value
pub const DEFAULT_CLOCK_SPEED: f64 = 1.0;

pub struct FlowMetricsAggregator<'a> {
    telemetry: &'a dyn TelemetrySource,
    namespace: &'a str,
    window: Duration,
    at: DateTime<Utc>,
    speed_overrides: BTreeMap<String, f64>,
    default_speed: f64,
}

impl<'a> FlowMetricsAggregator<'a> {
    pub fn new(telemetry: &'a dyn TelemetrySource, namespace: &'a str, window: Duration) -> Self {
        Self {
            telemetry,
            namespace,
            window,
            at: Utc::now(),
            speed_overrides: BTreeMap::new(),
            default_speed: DEFAULT_CLOCK_SPEED,
        }
    }

    /// Evaluate every query at a fixed instant
    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = at;
        self
    }

    /// Static per-host speeds and the fallback used by [`Self::collect_all`]
    pub fn with_node_speeds(mut self, overrides: BTreeMap<String, f64>, default: f64) -> Self {
        self.speed_overrides = overrides;
        self.default_speed = default;
        self
    }

    async fn scalar(&self, expr: &str) -> Result<f64> {
        let samples = self.telemetry.query(expr, self.at).await?;
        Ok(sum_values(&samples))
    }

    /// CPU utilization per replica, in percent of one core
    pub async fn cpu_utilization(&self, catalog: &ReplicaCatalog) -> Result<BTreeMap<String, u32>> {
        let mut out = BTreeMap::new();
        for replica in catalog.iter() {
            let expr = queries::replica_cpu_rate(self.namespace, &replica.name, self.window);
            let cores = self.scalar(&expr).await?;
            let percent = round_units(cores * 100.0).min(u32::MAX as u64) as u32;
            out.insert(replica.name.clone(), percent);
        }
        Ok(out)
    }

    /// Requests received per replica, summed over every inbound edge
    pub async fn request_counts(
        &self,
        graph: &DependencyGraph,
        catalog: &ReplicaCatalog,
    ) -> Result<BTreeMap<String, u64>> {
        let mut out: BTreeMap<String, u64> =
            catalog.iter().map(|r| (r.name.clone(), 0)).collect();

        for edge in graph.edges() {
            for replica in catalog.replicas_of(&edge.destination) {
                let expr = queries::edge_request_increase(
                    self.namespace,
                    &edge.source,
                    &replica.name,
                    self.window,
                );
                let count = round_units(self.scalar(&expr).await?);
                *out.entry(replica.name.clone()).or_default() += count;
            }
        }
        Ok(out)
    }

    /// Average latency per replica; replicas with no requests are omitted
    pub async fn request_durations(
        &self,
        graph: &DependencyGraph,
        catalog: &ReplicaCatalog,
        counts: &BTreeMap<String, u64>,
    ) -> Result<BTreeMap<String, u64>> {
        let mut totals: BTreeMap<String, f64> = BTreeMap::new();

        for edge in graph.edges() {
            for replica in catalog.replicas_of(&edge.destination) {
                if counts.get(&replica.name).copied().unwrap_or(0) == 0 {
                    continue;
                }
                let expr = queries::edge_duration_increase(
                    self.namespace,
                    &edge.source,
                    &replica.name,
                    self.window,
                );
                let sum = self.scalar(&expr).await?.max(0.0);
                *totals.entry(replica.name.clone()).or_default() += sum;
            }
        }

        Ok(totals
            .into_iter()
            .filter_map(|(name, total_ms)| {
                let count = *counts.get(&name)?;
                (count > 0).then(|| (name, round_units(total_ms / count as f64)))
            })
            .collect())
    }

    /// Relative clock speed per host: override, then gauge, then `default`
    pub async fn node_speeds(
        &self,
        catalog: &ReplicaCatalog,
        overrides: &BTreeMap<String, f64>,
        default: f64,
    ) -> Result<BTreeMap<String, f64>> {
        let hosts: BTreeSet<&str> = catalog.iter().map(|r| r.host.as_str()).collect();

        let needs_gauge = hosts.iter().any(|host| !overrides.contains_key(*host));
        let gauge: BTreeMap<String, f64> = if needs_gauge {
            self.telemetry
                .query(&queries::node_clock_speed(), self.at)
                .await?
                .into_iter()
                .filter(|s| s.value.is_finite() && s.value > 0.0)
                .filter_map(|s| {
                    let node = s
                        .label(queries::NODE_LABEL)
                        .or_else(|| s.label(queries::INSTANCE_LABEL))?;
                    let node = node.split(':').next().unwrap_or(node).to_string();
                    Some((node, s.value / HZ_PER_GHZ))
                })
                .collect()
        } else {
            BTreeMap::new()
        };

        Ok(hosts
            .into_iter()
            .map(|host| {
                let speed = overrides
                    .get(host)
                    .or_else(|| gauge.get(host))
                    .copied()
                    .unwrap_or_else(|| {
                        debug!(host = %host, speed = default, "No clock speed for host, using default");
                        default
                    });
                (host.to_string(), speed)
            })
            .collect())
    }

    /// Run every collector and write the signals into the catalog
    pub async fn collect_all(
        &self,
        graph: &DependencyGraph,
        catalog: &mut ReplicaCatalog,
        history: Option<&mut TelemetryHistory>,
    ) -> Result<()> {
        let cpu = self.cpu_utilization(catalog).await?;
        let counts = self.request_counts(graph, catalog).await?;
        let durations = self.request_durations(graph, catalog, &counts).await?;
        let speeds = self
            .node_speeds(catalog, &self.speed_overrides, self.default_speed)
            .await?;

        for replica in catalog.iter_mut() {
            replica.cpu_utilization = cpu.get(&replica.name).copied().unwrap_or(0);
            replica.request_count = counts.get(&replica.name).copied().unwrap_or(0);
            replica.request_latency_ms = durations.get(&replica.name).copied();
            replica.clock_speed = speeds
                .get(&replica.host)
                .copied()
                .unwrap_or(self.default_speed);
        }

        if let Some(history) = history {
            for replica in catalog.iter() {
                history.record(replica, self.at);
            }
        }

        info!(
            namespace = %self.namespace,
            replicas = catalog.replica_count(),
            hosts = speeds.len(),
            window_secs = self.window.as_secs(),
            "Flow metrics collected"
        );
        Ok(())
    }
}
