//! Even proportional split
//!
//! Every edge of the graph gets the same threshold list for all source
//! replicas; replica load is ignored.

use super::thresholds::{cumulative, even_shares};
use crate::catalog::ReplicaCatalog;
use crate::graph::DependencyGraph;
use crate::models::TrafficSplitPlan;
use tracing::debug;

pub fn allocate(graph: &DependencyGraph, catalog: &ReplicaCatalog) -> TrafficSplitPlan {
    let mut plan = TrafficSplitPlan::new();

    for edge in graph.edges() {
        let destinations: Vec<&str> = catalog
            .replicas_of(&edge.destination)
            .map(|r| r.name.as_str())
            .collect();
        if destinations.is_empty() {
            debug!(
                source = %edge.source,
                destination = %edge.destination,
                "Destination has no live replicas, skipping edge"
            );
            continue;
        }

        let shares = even_shares(destinations.len());
        let targets = cumulative(destinations.iter().copied().zip(shares));

        for source in catalog.replicas_of(&edge.source) {
            plan.insert(&edge.source, &edge.destination, &source.name, targets.clone());
        }
    }

    plan
}
