//! Topology resolution
//!
//! Maps a service name to its live replicas and their network identity.
//! [`KubeTopologyResolver`] reads Services and Pods from the cluster API.

mod kube_resolver;

pub use kube_resolver::KubeTopologyResolver;

use crate::error::Result;
use crate::models::ReplicaEndpoint;

pub use async_trait::async_trait;

/// Trait for topology backends
#[async_trait]
pub trait TopologyResolver: Send + Sync {
    /// Resolve live replicas in a namespace, optionally for one component only
    async fn resolve(
        &self,
        namespace: &str,
        component: Option<&str>,
    ) -> Result<Vec<ReplicaEndpoint>>;
}

/// Parse a Kubernetes CPU quantity (`"250m"`, `"1"`, `"0.5"`) into millicores
///
/// Fractions of a millicore round up, as the scheduler does.
pub fn parse_cpu_millicores(quantity: &str) -> Option<u64> {
    let quantity = quantity.trim();
    if quantity.is_empty() {
        return None;
    }

    let (number, scale) = match quantity.as_bytes()[quantity.len() - 1] {
        b'm' => (&quantity[..quantity.len() - 1], 1.0),
        b'u' => (&quantity[..quantity.len() - 1], 1e-3),
        b'n' => (&quantity[..quantity.len() - 1], 1e-6),
        b'k' => (&quantity[..quantity.len() - 1], 1e6),
        _ => (quantity, 1000.0),
    };

    let value: f64 = number.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * scale).ceil() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_millicores() {
        assert_eq!(parse_cpu_millicores("250m"), Some(250));
        assert_eq!(parse_cpu_millicores("1"), Some(1000));
        assert_eq!(parse_cpu_millicores("0.5"), Some(500));
        assert_eq!(parse_cpu_millicores("1.25"), Some(1250));
        assert_eq!(parse_cpu_millicores("500000n"), Some(1));
        assert_eq!(parse_cpu_millicores(""), None);
        assert_eq!(parse_cpu_millicores("lots"), None);
        assert_eq!(parse_cpu_millicores("-1"), None);
    }
}
