//! Component to replica catalog
//!
//! Replicas live in a single arena; components and replica names refer to
//! them by [`ReplicaId`]. The catalog is rebuilt on every computation and
//! enriched in place by the flow metrics aggregator.

mod view;

pub use view::{CatalogView, NamingStyle};

use crate::error::{Result, SteerError};
use crate::models::{Replica, ReplicaEndpoint, ReplicaId};
use crate::topology::TopologyResolver;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Which part of a namespace to resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogScope {
    /// Every component in the namespace
    Namespace,
    /// A single component
    Component(String),
}

impl CatalogScope {
    fn component(&self) -> Option<&str> {
        match self {
            CatalogScope::Namespace => None,
            CatalogScope::Component(name) => Some(name),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReplicaCatalog {
    replicas: Vec<Replica>,
    /// Components in first-resolved order
    components: Vec<String>,
    by_component: HashMap<String, Vec<ReplicaId>>,
    by_name: HashMap<String, ReplicaId>,
}

impl ReplicaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the replicas in scope; any resolver failure aborts the build
    pub async fn build(
        resolver: &dyn TopologyResolver,
        namespace: &str,
        scope: CatalogScope,
    ) -> Result<Self> {
        let endpoints = resolver.resolve(namespace, scope.component()).await?;
        let catalog = Self::from_endpoints(endpoints);

        info!(
            namespace = %namespace,
            scope = ?scope,
            components = catalog.components.len(),
            replicas = catalog.replica_count(),
            "Replica catalog built"
        );
        Ok(catalog)
    }

    /// Build from already-resolved endpoints, keeping resolver order
    pub fn from_endpoints(endpoints: impl IntoIterator<Item = ReplicaEndpoint>) -> Self {
        let mut catalog = Self::new();
        for endpoint in endpoints {
            catalog.push(Replica::from_endpoint(endpoint));
        }
        catalog
    }

    /// Add a replica; a name already listed under the same component is ignored
    pub fn push(&mut self, replica: Replica) -> ReplicaId {
        if let Some(ids) = self.by_component.get(&replica.component) {
            if let Some(&existing) = ids.iter().find(|&&id| self.replicas[id.0].name == replica.name) {
                debug!(replica = %replica.name, component = %replica.component, "Duplicate replica ignored");
                return existing;
            }
        }

        let id = ReplicaId(self.replicas.len());
        if !self.by_component.contains_key(&replica.component) {
            self.components.push(replica.component.clone());
        }
        self.by_component
            .entry(replica.component.clone())
            .or_default()
            .push(id);
        // A Pod selected by several Services keeps its first entry for name lookup
        self.by_name.entry(replica.name.clone()).or_insert(id);
        self.replicas.push(replica);
        id
    }

    /// Components in enumeration order
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(String::as_str)
    }

    pub fn contains_component(&self, component: &str) -> bool {
        self.by_component.contains_key(component)
    }

    /// Replica ids of a component in enumeration order; empty if unknown
    pub fn replica_ids(&self, component: &str) -> &[ReplicaId] {
        self.by_component
            .get(component)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn replicas_of(&self, component: &str) -> impl Iterator<Item = &Replica> + '_ {
        self.replica_ids(component)
            .iter()
            .map(move |id| &self.replicas[id.0])
    }

    /// Like [`Self::replica_ids`] but an empty component is an error
    pub fn require_replicas(&self, component: &str) -> Result<&[ReplicaId]> {
        let ids = self.replica_ids(component);
        if ids.is_empty() {
            return Err(SteerError::EmptyComponent {
                component: component.to_string(),
            });
        }
        Ok(ids)
    }

    pub fn replica(&self, id: ReplicaId) -> &Replica {
        &self.replicas[id.0]
    }

    pub fn get(&self, name: &str) -> Option<&Replica> {
        self.by_name.get(name).map(|id| &self.replicas[id.0])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Replica> {
        let id = *self.by_name.get(name)?;
        Some(&mut self.replicas[id.0])
    }

    /// Every replica, in arena order
    pub fn iter(&self) -> impl Iterator<Item = &Replica> {
        self.replicas.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Replica> {
        self.replicas.iter_mut()
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Snapshot as `component -> replicas`, ordered by component name
    pub fn to_map(&self) -> BTreeMap<String, Vec<Replica>> {
        self.components
            .iter()
            .map(|component| (component.clone(), self.replicas_of(component).cloned().collect()))
            .collect()
    }

    pub fn view(&self, naming: NamingStyle) -> CatalogView<'_> {
        CatalogView::new(self, naming)
    }
}
