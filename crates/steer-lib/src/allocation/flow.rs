//! Capacity-aware DAG flow distribution
//!
//! 100 abstract traffic units enter the first component of the topological
//! order and are propagated hop by hop between consecutive components. Each
//! replica can absorb a share of a hop's traffic proportional to its
//! normalized clock speed. Units are conserved at every hop.

use super::thresholds::{cumulative, normalize};
use crate::catalog::ReplicaCatalog;
use crate::error::Result;
use crate::graph::DependencyGraph;
use crate::models::{ReplicaId, TrafficSplitPlan};
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, info};

/// Traffic units entering the root component
pub const ROOT_UNITS: f64 = 100.0;

/// Amounts at or below this are treated as zero
const EPSILON: f64 = 1e-9;

/// Units moved from one upstream replica to one downstream replica
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplicaFlow {
    pub source: ReplicaId,
    pub destination: ReplicaId,
    pub units: f64,
}

/// Allocation between one pair of consecutive components
#[derive(Debug, Clone, Serialize)]
pub struct Hop {
    pub upstream: String,
    pub downstream: String,
    /// Whether the pair is an edge of the dependency graph
    pub observed: bool,
    /// Units the upstream component received
    pub supplied: f64,
    pub flows: Vec<ReplicaFlow>,
}

impl Hop {
    /// Units allocated across this hop
    pub fn allocated(&self) -> f64 {
        self.flows.iter().map(|f| f.units).sum()
    }

    /// Units sent by one upstream replica
    pub fn sent_by(&self, replica: ReplicaId) -> f64 {
        self.flows
            .iter()
            .filter(|f| f.source == replica)
            .map(|f| f.units)
            .sum()
    }

    fn units_between(&self, source: ReplicaId, destination: ReplicaId) -> f64 {
        self.flows
            .iter()
            .find(|f| f.source == source && f.destination == destination)
            .map_or(0.0, |f| f.units)
    }
}

/// Result of a flow distribution run
#[derive(Debug, Clone, Serialize)]
pub struct FlowAllocation {
    order: Vec<String>,
    capacity: Vec<f64>,
    received: Vec<f64>,
    hops: Vec<Hop>,
}

impl FlowAllocation {
    /// Components in propagation order
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }

    /// Normalized capacity of a replica within its component
    pub fn capacity(&self, replica: ReplicaId) -> f64 {
        self.capacity.get(replica.0).copied().unwrap_or(0.0)
    }

    /// Units a replica received
    pub fn received(&self, replica: ReplicaId) -> f64 {
        self.received.get(replica.0).copied().unwrap_or(0.0)
    }

    /// Units received by all replicas of a component
    pub fn component_received(&self, catalog: &ReplicaCatalog, component: &str) -> f64 {
        catalog
            .replica_ids(component)
            .iter()
            .map(|&id| self.received(id))
            .sum()
    }

    /// Convert the weighted replica edges into cumulative thresholds
    ///
    /// Only hops backed by an observed call become routes; the others stay
    /// in [`Self::hops`]. A source replica that sent nothing falls back to
    /// the downstream capacities so every list still covers 100%.
    pub fn into_plan(self, catalog: &ReplicaCatalog) -> TrafficSplitPlan {
        let mut plan = TrafficSplitPlan::new();

        for hop in self.hops.iter().filter(|hop| hop.observed) {
            let downstream = catalog.replica_ids(&hop.downstream);
            for &source in catalog.replica_ids(&hop.upstream) {
                let mut weights: Vec<f64> = downstream
                    .iter()
                    .map(|&d| hop.units_between(source, d))
                    .collect();
                if weights.iter().all(|w| *w <= EPSILON) {
                    weights = downstream.iter().map(|&d| self.capacity(d)).collect();
                }

                let shares = normalize(&weights);
                let targets = cumulative(
                    downstream
                        .iter()
                        .map(|&d| catalog.replica(d).name.as_str())
                        .zip(shares),
                );
                if !targets.is_empty() {
                    plan.insert(
                        &hop.upstream,
                        &hop.downstream,
                        &catalog.replica(source).name,
                        targets,
                    );
                }
            }
        }

        plan
    }
}

/// Per-run bookkeeping, indexed by [`ReplicaId`]
struct FlowState {
    capacity: Vec<f64>,
    received: Vec<f64>,
    remaining: Vec<f64>,
}

impl FlowState {
    fn new(replicas: usize) -> Self {
        Self {
            capacity: vec![0.0; replicas],
            received: vec![0.0; replicas],
            remaining: vec![0.0; replicas],
        }
    }

    /// Capacity = clock speed / component total; equal split when the total is zero
    fn normalize_capacity(&mut self, catalog: &ReplicaCatalog, ids: &[ReplicaId]) {
        let speed = |id: ReplicaId| {
            let s = catalog.replica(id).clock_speed;
            if s.is_finite() && s > 0.0 {
                s
            } else {
                0.0
            }
        };
        let total: f64 = ids.iter().map(|&id| speed(id)).sum();

        for &id in ids {
            let capacity = if total > EPSILON {
                speed(id) / total
            } else {
                1.0 / ids.len() as f64
            };
            self.capacity[id.0] = capacity;
            self.remaining[id.0] = capacity;
        }
    }

    /// Round capacity shares of the root units; residual goes to the first replica
    fn distribute_root(&mut self, ids: &[ReplicaId]) {
        let mut assigned = 0.0;
        for &id in ids {
            let units = (self.capacity[id.0] * ROOT_UNITS + 0.5).floor();
            self.received[id.0] = units;
            assigned += units;
        }

        let mut residual = ROOT_UNITS - assigned;
        for &id in ids {
            if residual >= 0.0 {
                self.received[id.0] += residual;
                break;
            }
            // Over-assignment from rounding: take back from replicas in order
            let take = (-residual).min(self.received[id.0]);
            self.received[id.0] -= take;
            residual += take;
            if residual >= 0.0 {
                break;
            }
        }
    }

    fn record(&mut self, flows: &mut Vec<ReplicaFlow>, source: ReplicaId, destination: ReplicaId, units: f64) {
        self.remaining[source.0] -= units;
        self.remaining[destination.0] = (self.remaining[destination.0] - units).max(0.0);
        self.received[destination.0] += units;
        match flows
            .iter_mut()
            .find(|f| f.source == source && f.destination == destination)
        {
            Some(flow) => flow.units += units,
            None => flows.push(ReplicaFlow {
                source,
                destination,
                units,
            }),
        }
    }

    /// Fewest deficient touches first, then largest remaining demand
    fn best_downstream(
        &self,
        downstream: &[ReplicaId],
        deficient: &[u32],
        excluded: &[bool],
    ) -> Option<usize> {
        (0..downstream.len())
            .filter(|&i| !excluded[i])
            .min_by(|&a, &b| {
                deficient[a].cmp(&deficient[b]).then_with(|| {
                    self.remaining[downstream[b].0]
                        .partial_cmp(&self.remaining[downstream[a].0])
                        .unwrap_or(Ordering::Equal)
                })
            })
    }

    fn propagate(&mut self, upstream: &[ReplicaId], downstream: &[ReplicaId]) -> (f64, Vec<ReplicaFlow>) {
        let supplied: f64 = upstream.iter().map(|&u| self.received[u.0]).sum();
        for &u in upstream {
            self.remaining[u.0] = self.received[u.0];
        }
        for &d in downstream {
            self.remaining[d.0] = self.capacity[d.0] * supplied;
        }

        let mut flows = Vec::new();
        let mut deficient = vec![0u32; downstream.len()];

        // Saturating pass
        for &u in upstream {
            for (i, &d) in downstream.iter().enumerate() {
                let units = self.remaining[u.0].min(self.remaining[d.0]);
                if units > EPSILON {
                    self.record(&mut flows, u, d, units);
                } else {
                    deficient[i] += 1;
                }
            }
        }

        // Deficiency-minimizing pass
        let none_excluded = vec![false; downstream.len()];
        for &u in upstream {
            while self.remaining[u.0] > EPSILON {
                let mut excluded = vec![false; downstream.len()];
                let placed = loop {
                    let Some(i) = self.best_downstream(downstream, &deficient, &excluded) else {
                        break false;
                    };
                    let units = self.remaining[u.0].min(self.remaining[downstream[i].0]);
                    if units > EPSILON {
                        self.record(&mut flows, u, downstream[i], units);
                        break true;
                    }
                    deficient[i] += 1;
                    excluded[i] = true;
                };
                if !placed {
                    break;
                }
            }

            // Demand exhausted with supply left over: floating-point residue only
            let residue = self.remaining[u.0];
            if residue > 0.0 {
                if let Some(i) = self.best_downstream(downstream, &deficient, &none_excluded) {
                    debug!(residue, "Assigning allocation residue to best downstream replica");
                    self.record(&mut flows, u, downstream[i], residue);
                }
            }
        }

        (supplied, flows)
    }
}

/// Propagate traffic units down the DAG
///
/// Fails if the graph has a cycle or any component in the order has no
/// replicas in the catalog.
pub fn distribute(graph: &DependencyGraph, catalog: &ReplicaCatalog) -> Result<FlowAllocation> {
    let order = graph.topological_order()?;
    let mut state = FlowState::new(catalog.replica_count());

    for component in &order {
        let ids = catalog.require_replicas(component)?;
        state.normalize_capacity(catalog, ids);
    }

    let mut hops = Vec::with_capacity(order.len().saturating_sub(1));
    if let Some(root) = order.first() {
        state.distribute_root(catalog.require_replicas(root)?);

        for pair in order.windows(2) {
            let (upstream, downstream) = (&pair[0], &pair[1]);
            let (supplied, flows) = state.propagate(
                catalog.replica_ids(upstream),
                catalog.replica_ids(downstream),
            );
            hops.push(Hop {
                upstream: upstream.clone(),
                downstream: downstream.clone(),
                observed: graph.contains_edge(upstream, downstream),
                supplied,
                flows,
            });
        }
    }

    info!(
        components = order.len(),
        hops = hops.len(),
        "Capacity-aware flow distribution complete"
    );

    Ok(FlowAllocation {
        order,
        capacity: state.capacity,
        received: state.received,
        hops,
    })
}
