//! Service dependency graph
//!
//! Components are stored once in an arena and edges reference them by
//! index. Edges are derived from observed traffic only: an edge exists iff
//! at least one in-window sample between the two components was seen.

mod topo;

use crate::error::Result;
use crate::models::TrafficSample;
use crate::telemetry::{queries, TelemetrySource};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, info};

/// Directed edge between two components, by name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub source: String,
    pub destination: String,
}

/// Directed graph of observed component-to-component traffic
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    names: Vec<String>,
    index: HashMap<String, usize>,
    successors: Vec<BTreeSet<usize>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a window of traffic samples
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a TrafficSample>) -> Self {
        let mut graph = Self::new();
        for sample in samples {
            graph.observe_sample(sample);
        }
        graph
    }

    /// Query the dependency edges observed in a namespace and build the graph
    pub async fn observe(
        telemetry: &dyn TelemetrySource,
        namespace: &str,
        window: Duration,
    ) -> Result<Self> {
        let expr = queries::dependency_edges(namespace, window);
        let result = telemetry.query(&expr, chrono::Utc::now()).await?;

        let samples: Vec<TrafficSample> = result
            .iter()
            .filter_map(|sample| {
                // A series that did not increase in the window is not traffic
                if !(sample.value.is_finite() && sample.value > 0.0) {
                    return None;
                }
                let source = sample.label(queries::SOURCE_SERVICE_LABEL)?;
                let destination = sample.label(queries::DESTINATION_SERVICE_LABEL)?;
                Some(TrafficSample::new(source, destination))
            })
            .collect();

        let graph = Self::from_samples(&samples);
        info!(
            namespace = %namespace,
            samples = samples.len(),
            components = graph.component_count(),
            edges = graph.edge_count(),
            "Dependency graph built"
        );
        Ok(graph)
    }

    /// Record one sample; unresolved endpoints and self-loops are ignored
    pub fn observe_sample(&mut self, sample: &TrafficSample) {
        if sample.is_unresolved() {
            debug!(source = %sample.source, destination = %sample.destination, "Skipping unresolved sample");
            return;
        }
        if sample.source == sample.destination {
            return;
        }
        let from = self.intern(&sample.source);
        let to = self.intern(&sample.destination);
        self.successors[from].insert(to);
    }

    fn intern(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.names.len();
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), idx);
        self.successors.push(BTreeSet::new());
        idx
    }

    /// Component names in first-seen order
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn component_count(&self) -> usize {
        self.names.len()
    }

    pub fn edge_count(&self) -> usize {
        self.successors.iter().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains_component(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn contains_edge(&self, source: &str, destination: &str) -> bool {
        match (self.index.get(source), self.index.get(destination)) {
            (Some(&from), Some(&to)) => self.successors[from].contains(&to),
            _ => false,
        }
    }

    /// Downstream components of `name`, sorted by name
    pub fn successors(&self, name: &str) -> Vec<&str> {
        let mut out: Vec<&str> = self
            .index
            .get(name)
            .map(|&idx| {
                self.successors[idx]
                    .iter()
                    .map(|&to| self.names[to].as_str())
                    .collect()
            })
            .unwrap_or_default();
        out.sort_unstable();
        out
    }

    /// All edges, sorted by (source, destination)
    pub fn edges(&self) -> Vec<DependencyEdge> {
        let mut edges: Vec<DependencyEdge> = self
            .successors
            .iter()
            .enumerate()
            .flat_map(|(from, tos)| {
                tos.iter().map(move |&to| DependencyEdge {
                    source: self.names[from].clone(),
                    destination: self.names[to].clone(),
                })
            })
            .collect();
        edges.sort();
        edges
    }
}
