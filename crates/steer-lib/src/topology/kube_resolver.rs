//! Topology resolution from the Kubernetes API

use super::{async_trait, parse_cpu_millicores, TopologyResolver};
use crate::error::{Result, SteerError};
use crate::models::ReplicaEndpoint;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{Api, ListParams};
use kube::Client;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Resolves replicas as the Pods selected by each Service
pub struct KubeTopologyResolver {
    client: Client,
}

impl KubeTopologyResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Use in-cluster configuration, falling back to the local kubeconfig
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| SteerError::Topology {
                namespace: String::new(),
                reason: format!("failed to create Kubernetes client: {}", e),
            })?;
        Ok(Self::new(client))
    }

    async fn replicas_of_service(
        &self,
        namespace: &str,
        service: &Service,
    ) -> Result<Vec<ReplicaEndpoint>> {
        let Some(component) = service.metadata.name.clone() else {
            return Ok(Vec::new());
        };
        let Some(spec) = service.spec.as_ref() else {
            return Ok(Vec::new());
        };
        let selector = match spec.selector.as_ref() {
            Some(selector) if !selector.is_empty() => label_selector(selector),
            _ => {
                debug!(service = %component, "Service has no selector, skipping");
                return Ok(Vec::new());
            }
        };

        let ports: Vec<u16> = spec
            .ports
            .iter()
            .flatten()
            .filter_map(|p| u16::try_from(p.port).ok())
            .collect();

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(|e| topology_error(namespace, format!("listing pods of `{}`: {}", component, e)))?;

        Ok(list
            .items
            .iter()
            .filter_map(|pod| endpoint_from_pod(&component, &ports, pod))
            .collect())
    }
}

fn topology_error(namespace: &str, reason: String) -> SteerError {
    SteerError::Topology {
        namespace: namespace.to_string(),
        reason,
    }
}

fn label_selector(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Convert a Pod into an endpoint; Pods without an IP are not live yet
fn endpoint_from_pod(component: &str, ports: &[u16], pod: &Pod) -> Option<ReplicaEndpoint> {
    let name = pod.metadata.name.clone()?;
    let address = pod.status.as_ref()?.pod_ip.clone()?;
    let spec = pod.spec.as_ref()?;

    let cpu_request_millicores = spec
        .containers
        .iter()
        .filter_map(|c| c.resources.as_ref()?.requests.as_ref()?.get("cpu"))
        .filter_map(|q| parse_cpu_millicores(&q.0))
        .sum();

    Some(ReplicaEndpoint {
        component: component.to_string(),
        name,
        address,
        host: spec.node_name.clone().unwrap_or_default(),
        ports: ports.to_vec(),
        cpu_request_millicores,
    })
}

#[async_trait]
impl TopologyResolver for KubeTopologyResolver {
    async fn resolve(
        &self,
        namespace: &str,
        component: Option<&str>,
    ) -> Result<Vec<ReplicaEndpoint>> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);

        let targets = match component {
            // An absent Service is an unknown component, not a backend failure
            Some(name) => match services.get(name).await {
                Ok(service) => vec![service],
                Err(kube::Error::Api(response)) if response.code == 404 => {
                    debug!(namespace = %namespace, service = %name, "Service not found");
                    Vec::new()
                }
                Err(e) => {
                    return Err(topology_error(
                        namespace,
                        format!("getting service `{}`: {}", name, e),
                    ))
                }
            },
            None => {
                services
                    .list(&ListParams::default())
                    .await
                    .map_err(|e| topology_error(namespace, format!("listing services: {}", e)))?
                    .items
            }
        };

        let mut endpoints = Vec::new();
        for service in &targets {
            endpoints.extend(self.replicas_of_service(namespace, service).await?);
        }

        info!(
            namespace = %namespace,
            services = targets.len(),
            replicas = endpoints.len(),
            "Resolved replica topology"
        );
        Ok(endpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, PodSpec, PodStatus, ResourceRequirements};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use kube::api::ObjectMeta;

    fn pod(name: &str, ip: Option<&str>, cpu: &[&str]) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some("worker1".to_string()),
                containers: cpu
                    .iter()
                    .map(|q| Container {
                        name: "app".to_string(),
                        resources: Some(ResourceRequirements {
                            requests: Some(BTreeMap::from([(
                                "cpu".to_string(),
                                Quantity(q.to_string()),
                            )])),
                            ..Default::default()
                        }),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            }),
            status: Some(PodStatus {
                pod_ip: ip.map(str::to_string),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_endpoint_sums_container_requests() {
        let endpoint = endpoint_from_pod("cart", &[8080], &pod("cart-0", Some("10.1.0.7"), &["250m", "0.5"]))
            .unwrap();
        assert_eq!(endpoint.component, "cart");
        assert_eq!(endpoint.address, "10.1.0.7");
        assert_eq!(endpoint.host, "worker1");
        assert_eq!(endpoint.ports, vec![8080]);
        assert_eq!(endpoint.cpu_request_millicores, 750);
    }

    #[test]
    fn test_pod_without_ip_is_not_live() {
        assert!(endpoint_from_pod("cart", &[], &pod("cart-1", None, &[])).is_none());
    }

    #[test]
    fn test_label_selector_format() {
        let selector = BTreeMap::from([
            ("app".to_string(), "cart".to_string()),
            ("tier".to_string(), "backend".to_string()),
        ]);
        assert_eq!(label_selector(&selector), "app=cart,tier=backend");
    }
}
