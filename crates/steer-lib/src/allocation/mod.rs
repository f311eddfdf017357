//! Allocation engine
//!
//! Turns a dependency graph and an annotated replica catalog into a
//! [`TrafficSplitPlan`]. Two interchangeable strategies are provided:
//!
//! - [`even`]: structural split of 100% across destination replicas
//! - [`flow`]: capacity-aware propagation of traffic units down the DAG

pub mod even;
pub mod flow;
pub mod thresholds;

use crate::catalog::ReplicaCatalog;
use crate::error::{Result, SteerError};
use crate::graph::DependencyGraph;
use crate::models::TrafficSplitPlan;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllocationStrategy {
    /// Even proportional split, ignoring load
    #[default]
    Even,
    /// Capacity-aware DAG flow distribution
    CapacityAware,
}

impl AllocationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationStrategy::Even => "even",
            AllocationStrategy::CapacityAware => "capacity-aware",
        }
    }
}

impl fmt::Display for AllocationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AllocationStrategy {
    type Err = SteerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "even" => Ok(AllocationStrategy::Even),
            "capacity-aware" | "capacity" => Ok(AllocationStrategy::CapacityAware),
            other => Err(SteerError::InvalidArgument(format!(
                "unknown allocation strategy `{}` (expected even or capacity-aware)",
                other
            ))),
        }
    }
}

/// Run `strategy` and check the resulting plan's threshold invariant
pub fn allocate(
    strategy: AllocationStrategy,
    graph: &DependencyGraph,
    catalog: &ReplicaCatalog,
) -> Result<TrafficSplitPlan> {
    let plan = match strategy {
        AllocationStrategy::Even => even::allocate(graph, catalog),
        AllocationStrategy::CapacityAware => flow::distribute(graph, catalog)?.into_plan(catalog),
    };
    plan.validate()?;
    Ok(plan)
}
