//! API client for communicating with the steering controller

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

/// Failure reported by the controller in its error body
#[derive(Debug, Error)]
#[error("API error ({status}, {kind}): {message}")]
pub struct ApiError {
    pub status: u16,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    kind: String,
}

/// API client for the steering controller
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request with query parameters; `None` values are left out
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, Option<String>)],
    ) -> Result<T> {
        let mut url = self.base_url.join(path).context("Invalid path")?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                if let Some(value) = value {
                    pairs.append_pair(key, value);
                }
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ErrorBody>(&body) {
                Ok(parsed) => ApiError {
                    status: status.as_u16(),
                    kind: parsed.kind,
                    message: parsed.error,
                },
                Err(_) => ApiError {
                    status: status.as_u16(),
                    kind: "unknown".to_string(),
                    message: body,
                },
            }
            .into());
        }

        response.json().await.context("Failed to parse response")
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphResponse {
    pub namespace: String,
    pub components: Vec<String>,
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replica {
    pub name: String,
    pub address: String,
    pub component: String,
    pub ports: Vec<u16>,
    pub host: String,
    pub cpu_utilization: u32,
    pub request_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_latency_ms: Option<u64>,
    pub cpu_request_millicores: u64,
    pub clock_speed: f64,
}

pub type ReplicaMap = BTreeMap<String, Vec<Replica>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitTarget {
    pub destination_replica: String,
    pub threshold: u8,
}

/// `source component -> destination component -> source replica -> targets`
pub type SplitPlan = BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<SplitTarget>>>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanReport {
    pub namespace: String,
    pub strategy: String,
    pub generated_at: String,
    pub window_secs: u64,
    pub graph: Vec<Edge>,
    pub replicas: ReplicaMap,
    pub plan: SplitPlan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub recorded_at: String,
    pub cpu_utilization: u32,
    pub request_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_latency_ms: Option<u64>,
    pub clock_speed: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub replica: String,
    pub snapshots: Vec<Snapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_cpu: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendHealth {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub backends: BTreeMap<String, BackendHealth>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_error_body_is_decoded() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/plan")
            .match_query(mockito::Matcher::UrlEncoded(
                "strategy".into(),
                "bogus".into(),
            ))
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"invalid argument: unknown strategy","kind":"input"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .get::<PlanReport>(
                "api/v1/plan",
                &[("strategy", Some("bogus".to_string())), ("window", None)],
            )
            .await
            .unwrap_err();

        let api_err = err.downcast_ref::<ApiError>().unwrap();
        assert_eq!(api_err.status, 400);
        assert_eq!(api_err.kind, "input");
        assert!(api_err.message.contains("unknown strategy"));
    }

    #[tokio::test]
    async fn test_plain_error_body_is_kept() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/healthz")
            .with_status(503)
            .with_body("upstream connect error")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .get::<HealthResponse>("healthz", &[])
            .await
            .unwrap_err();

        let api_err = err.downcast_ref::<ApiError>().unwrap();
        assert_eq!(api_err.kind, "unknown");
        assert_eq!(api_err.message, "upstream connect error");
    }
}
