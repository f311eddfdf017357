//! Core data models for traffic steering

use crate::error::{Result, SteerError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sentinel the mesh reports when it cannot attribute traffic to a service
pub const UNRESOLVED_COMPONENT: &str = "unknown";

/// Upper bound of every cumulative threshold list
pub const FULL_COVERAGE: u8 = 100;

/// Index of a replica inside a [`crate::ReplicaCatalog`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReplicaId(pub usize);

/// One observed call between two components
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficSample {
    pub source: String,
    pub destination: String,
}

impl TrafficSample {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    /// True if either endpoint could not be attributed to a component
    pub fn is_unresolved(&self) -> bool {
        self.source == UNRESOLVED_COMPONENT || self.destination == UNRESOLVED_COMPONENT
    }
}

/// Network identity of a live replica as reported by the topology resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaEndpoint {
    pub component: String,
    pub name: String,
    pub address: String,
    pub host: String,
    pub ports: Vec<u16>,
    pub cpu_request_millicores: u64,
}

/// One running instance of a component, annotated with load and capacity signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replica {
    pub name: String,
    pub address: String,
    pub component: String,
    pub ports: Vec<u16>,
    pub host: String,
    /// Percent of one core over the observation window
    pub cpu_utilization: u32,
    /// Requests received over the observation window
    pub request_count: u64,
    /// Average latency in milliseconds; absent when no requests were received
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_latency_ms: Option<u64>,
    pub cpu_request_millicores: u64,
    /// Relative clock speed of the host node
    pub clock_speed: f64,
}

impl Replica {
    pub fn from_endpoint(endpoint: ReplicaEndpoint) -> Self {
        Self {
            name: endpoint.name,
            address: endpoint.address,
            component: endpoint.component,
            ports: endpoint.ports,
            host: endpoint.host,
            cpu_utilization: 0,
            request_count: 0,
            request_latency_ms: None,
            cpu_request_millicores: endpoint.cpu_request_millicores,
            clock_speed: 0.0,
        }
    }

    /// CPU utilization relative to the declared request, in percent
    ///
    /// Returns `None` when the replica declares no CPU request.
    pub fn request_relative_utilization(&self) -> Option<u32> {
        if self.cpu_request_millicores == 0 {
            return None;
        }
        let used_millicores = self.cpu_utilization as f64 * 10.0;
        Some((used_millicores / self.cpu_request_millicores as f64 * 100.0).round() as u32)
    }
}

/// One destination replica with its cumulative percentage threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitTarget {
    pub destination_replica: String,
    pub threshold: u8,
}

impl SplitTarget {
    pub fn new(destination_replica: impl Into<String>, threshold: u8) -> Self {
        Self {
            destination_replica: destination_replica.into(),
            threshold,
        }
    }
}

/// source replica -> ordered split targets
pub type ReplicaSplits = BTreeMap<String, Vec<SplitTarget>>;

/// Allocation engine output
///
/// `source component -> destination component -> source replica -> targets`.
/// For every list the thresholds are strictly increasing and end at 100.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrafficSplitPlan {
    routes: BTreeMap<String, BTreeMap<String, ReplicaSplits>>,
}

impl TrafficSplitPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the split list for one (source replica, destination component) pair
    pub fn insert(
        &mut self,
        source_component: &str,
        destination_component: &str,
        source_replica: &str,
        targets: Vec<SplitTarget>,
    ) {
        self.routes
            .entry(source_component.to_string())
            .or_default()
            .entry(destination_component.to_string())
            .or_default()
            .insert(source_replica.to_string(), targets);
    }

    pub fn targets(
        &self,
        source_component: &str,
        destination_component: &str,
        source_replica: &str,
    ) -> Option<&[SplitTarget]> {
        self.routes
            .get(source_component)?
            .get(destination_component)?
            .get(source_replica)
            .map(Vec::as_slice)
    }

    pub fn destinations(
        &self,
        source_component: &str,
        destination_component: &str,
    ) -> Option<&ReplicaSplits> {
        self.routes.get(source_component)?.get(destination_component)
    }

    pub fn routes(&self) -> &BTreeMap<String, BTreeMap<String, ReplicaSplits>> {
        &self.routes
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Number of (source replica, destination component) lists
    pub fn len(&self) -> usize {
        self.routes
            .values()
            .flat_map(|dests| dests.values())
            .map(|splits| splits.len())
            .sum()
    }

    /// Pick the destination replica for a uniformly drawn integer in `0..=100`
    pub fn select(
        &self,
        source_component: &str,
        destination_component: &str,
        source_replica: &str,
        draw: u8,
    ) -> Option<&str> {
        self.targets(source_component, destination_component, source_replica)?
            .iter()
            .find(|target| target.threshold >= draw)
            .map(|target| target.destination_replica.as_str())
    }

    /// Check the coverage and monotonicity invariant of every list
    pub fn validate(&self) -> Result<()> {
        for (source_component, dests) in &self.routes {
            for (destination_component, splits) in dests {
                for (source_replica, targets) in splits {
                    let violation = |reason: String| SteerError::InvalidPlan {
                        source_component: source_component.clone(),
                        destination_component: destination_component.clone(),
                        source_replica: source_replica.clone(),
                        reason,
                    };

                    let last = targets
                        .last()
                        .ok_or_else(|| violation("empty target list".to_string()))?;
                    if last.threshold != FULL_COVERAGE {
                        return Err(violation(format!(
                            "last threshold is {}, expected {}",
                            last.threshold, FULL_COVERAGE
                        )));
                    }
                    if let Some(pair) = targets.windows(2).find(|w| w[0].threshold >= w[1].threshold)
                    {
                        return Err(violation(format!(
                            "threshold {} is not below {}",
                            pair[0].threshold, pair[1].threshold
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
