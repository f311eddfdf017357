//! HTTP client for Prometheus-compatible instant queries

use super::{async_trait, Sample, TelemetrySource};
use crate::error::{Result, SteerError};
use crate::observability::SteerMetrics;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Configuration for the Prometheus client
#[derive(Debug, Clone)]
pub struct PrometheusConfig {
    /// Base URL of the query API (without `/api/v1/query`)
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            base_url: "http://prometheus-service.monitoring.svc.cluster.local:8080".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Telemetry source backed by the Prometheus HTTP API
pub struct PrometheusClient {
    client: Client,
    query_url: Url,
    metrics: SteerMetrics,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
enum QueryData {
    Vector(Vec<VectorEntry>),
    Scalar((f64, String)),
    Matrix(serde_json::Value),
    String(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct VectorEntry {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    value: (f64, String),
}

impl PrometheusClient {
    pub fn new(config: PrometheusConfig) -> Result<Self> {
        let mut base = Url::parse(&config.base_url).map_err(|e| {
            SteerError::InvalidArgument(format!("telemetry URL `{}`: {}", config.base_url, e))
        })?;
        // Keep any path prefix (e.g. behind a proxy) when joining
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let query_url = base
            .join("api/v1/query")
            .map_err(|e| SteerError::InvalidArgument(format!("telemetry URL: {}", e)))?;

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            query_url,
            metrics: SteerMetrics::new(),
        })
    }

    fn decode(expr: &str, response: QueryResponse) -> Result<Vec<Sample>> {
        let malformed = |reason: String| SteerError::MalformedTelemetry {
            query: expr.to_string(),
            reason,
        };

        if response.status != "success" {
            return Err(SteerError::Telemetry(format!(
                "{}: {}",
                response.error_type.unwrap_or_else(|| "error".to_string()),
                response.error.unwrap_or_default()
            )));
        }

        for warning in &response.warnings {
            warn!(query = %expr, warning = %warning, "Telemetry backend returned a warning");
        }

        match response.data {
            Some(QueryData::Vector(entries)) => entries
                .into_iter()
                .map(|entry| {
                    let value = parse_value(&entry.value.1).map_err(&malformed)?;
                    Ok(Sample {
                        labels: entry.metric,
                        value,
                    })
                })
                .collect(),
            Some(QueryData::Scalar((_, raw))) => {
                let value = parse_value(&raw).map_err(&malformed)?;
                Ok(vec![Sample {
                    labels: BTreeMap::new(),
                    value,
                }])
            }
            Some(QueryData::Matrix(_)) | Some(QueryData::String(_)) => {
                Err(malformed("expected an instant vector".to_string()))
            }
            None => Err(malformed("response carries no data".to_string())),
        }
    }
}

fn parse_value(raw: &str) -> std::result::Result<f64, String> {
    match raw {
        "NaN" => Ok(f64::NAN),
        "+Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        _ => raw
            .parse::<f64>()
            .map_err(|e| format!("invalid sample value `{}`: {}", raw, e)),
    }
}

#[async_trait]
impl TelemetrySource for PrometheusClient {
    async fn query(&self, expr: &str, at: DateTime<Utc>) -> Result<Vec<Sample>> {
        let start = Instant::now();
        let time = format!("{:.3}", at.timestamp_millis() as f64 / 1000.0);

        let response = self
            .client
            .get(self.query_url.clone())
            .query(&[("query", expr), ("time", time.as_str())])
            .send()
            .await;
        self.metrics
            .observe_query_latency(start.elapsed().as_secs_f64());

        let response = response.map_err(|e| {
            self.metrics.inc_query_errors();
            SteerError::Telemetry(e.to_string())
        })?;

        let status = response.status();
        let body = response.text().await?;
        let decoded = serde_json::from_str::<QueryResponse>(&body)
            .map_err(|e| SteerError::MalformedTelemetry {
                query: expr.to_string(),
                reason: format!("HTTP {}: {}", status, e),
            })
            .and_then(|parsed| Self::decode(expr, parsed));

        match decoded {
            Ok(samples) => {
                debug!(query = %expr, samples = samples.len(), "Telemetry query complete");
                Ok(samples)
            }
            Err(e) => {
                self.metrics.inc_query_errors();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_json(body: &str) -> Result<Vec<Sample>> {
        let parsed: QueryResponse = serde_json::from_str(body).unwrap();
        PrometheusClient::decode("up", parsed)
    }

    #[test]
    fn test_decode_vector() {
        let samples = decode_json(
            r#"{"status":"success","data":{"resultType":"vector","result":[
                {"metric":{"pod":"cart-0"},"value":[1700000000.1,"0.42"]},
                {"metric":{"pod":"cart-1"},"value":[1700000000.1,"1"]}
            ]}}"#,
        )
        .unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].label("pod"), Some("cart-0"));
        assert_eq!(samples[0].value, 0.42);
    }

    #[test]
    fn test_decode_scalar() {
        let samples =
            decode_json(r#"{"status":"success","data":{"resultType":"scalar","result":[1.0,"7"]}}"#)
                .unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, 7.0);
    }

    #[test]
    fn test_decode_error_status() {
        let err = decode_json(r#"{"status":"error","errorType":"bad_data","error":"parse error"}"#)
            .unwrap_err();
        assert!(matches!(err, SteerError::Telemetry(ref msg) if msg.contains("bad_data")));
    }

    #[test]
    fn test_decode_rejects_matrix() {
        let err =
            decode_json(r#"{"status":"success","data":{"resultType":"matrix","result":[]}}"#)
                .unwrap_err();
        assert!(matches!(err, SteerError::MalformedTelemetry { .. }));
    }

    #[test]
    fn test_decode_rejects_bad_value() {
        let err = decode_json(
            r#"{"status":"success","data":{"resultType":"vector","result":[{"metric":{},"value":[1,"abc"]}]}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SteerError::MalformedTelemetry { .. }));
    }

    #[test]
    fn test_invalid_base_url() {
        let result = PrometheusClient::new(PrometheusConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(SteerError::InvalidArgument(_))));
    }
}
