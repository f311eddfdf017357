//! Presentation of a catalog under replica or pod naming
//!
//! Both styles serialize the same records; only field names differ.

use super::ReplicaCatalog;
use crate::models::Replica;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingStyle {
    #[default]
    Replica,
    Pod,
}

impl FromStr for NamingStyle {
    type Err = crate::error::SteerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "replica" => Ok(NamingStyle::Replica),
            "pod" => Ok(NamingStyle::Pod),
            other => Err(crate::error::SteerError::InvalidArgument(format!(
                "unknown naming style `{}` (expected replica or pod)",
                other
            ))),
        }
    }
}

#[derive(serde::Serialize)]
struct PodRecord<'a> {
    pod_name: &'a str,
    pod_ip: &'a str,
    service_name: &'a str,
    ports: &'a [u16],
    node_name: &'a str,
    cpu_utilization: u32,
    received_request_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_duration_ms: Option<u64>,
    cpu_request_millicores: u64,
    node_cpu_hz: f64,
}

impl<'a> From<&'a Replica> for PodRecord<'a> {
    fn from(r: &'a Replica) -> Self {
        Self {
            pod_name: &r.name,
            pod_ip: &r.address,
            service_name: &r.component,
            ports: &r.ports,
            node_name: &r.host,
            cpu_utilization: r.cpu_utilization,
            received_request_count: r.request_count,
            request_duration_ms: r.request_latency_ms,
            cpu_request_millicores: r.cpu_request_millicores,
            node_cpu_hz: r.clock_speed,
        }
    }
}

struct ComponentEntries<'a> {
    catalog: &'a ReplicaCatalog,
    component: &'a str,
    naming: NamingStyle,
}

impl Serialize for ComponentEntries<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.naming {
            NamingStyle::Replica => {
                serializer.collect_seq(self.catalog.replicas_of(self.component))
            }
            NamingStyle::Pod => serializer.collect_seq(
                self.catalog
                    .replicas_of(self.component)
                    .map(PodRecord::from),
            ),
        }
    }
}

/// `component -> [records]` in catalog enumeration order
pub struct CatalogView<'a> {
    catalog: &'a ReplicaCatalog,
    naming: NamingStyle,
}

impl<'a> CatalogView<'a> {
    pub fn new(catalog: &'a ReplicaCatalog, naming: NamingStyle) -> Self {
        Self { catalog, naming }
    }
}

impl Serialize for CatalogView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.catalog.components.len()))?;
        for component in self.catalog.components() {
            map.serialize_entry(
                component,
                &ComponentEntries {
                    catalog: self.catalog,
                    component,
                    naming: self.naming,
                },
            )?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::endpoint;

    #[test]
    fn test_pod_naming_renames_fields() {
        let mut catalog = ReplicaCatalog::from_endpoints(vec![endpoint("cart", "cart-0", "w1")]);
        catalog.get_mut("cart-0").unwrap().request_count = 12;

        let json = serde_json::to_value(catalog.view(NamingStyle::Pod)).unwrap();
        assert_eq!(json["cart"][0]["pod_name"], "cart-0");
        assert_eq!(json["cart"][0]["node_name"], "w1");
        assert_eq!(json["cart"][0]["received_request_count"], 12);
        assert!(json["cart"][0].get("request_duration_ms").is_none());

        let json = serde_json::to_value(catalog.view(NamingStyle::Replica)).unwrap();
        assert_eq!(json["cart"][0]["name"], "cart-0");
        assert_eq!(json["cart"][0]["request_count"], 12);
    }

    #[test]
    fn test_naming_style_from_str() {
        assert_eq!("pod".parse::<NamingStyle>().unwrap(), NamingStyle::Pod);
        assert_eq!("Replica".parse::<NamingStyle>().unwrap(), NamingStyle::Replica);
        assert!("node".parse::<NamingStyle>().is_err());
    }
}
