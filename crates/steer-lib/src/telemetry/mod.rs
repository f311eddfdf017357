//! Telemetry snapshot provider
//!
//! The pipeline only needs point-in-time numeric queries filtered by
//! namespace, component and replica labels. [`PrometheusClient`] talks to a
//! Prometheus-compatible HTTP query endpoint.

mod prometheus_client;
pub mod queries;

pub use self::prometheus_client::{PrometheusClient, PrometheusConfig};

use crate::error::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub use async_trait::async_trait;

/// One labelled value returned by a query
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

impl Sample {
    pub fn new(labels: impl IntoIterator<Item = (String, String)>, value: f64) -> Self {
        Self {
            labels: labels.into_iter().collect(),
            value,
        }
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }
}

/// Trait for telemetry backends
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Evaluate a query expression at a point in time
    async fn query(&self, expr: &str, at: DateTime<Utc>) -> Result<Vec<Sample>>;
}

/// Sum all sample values of a result vector
pub fn sum_values(samples: &[Sample]) -> f64 {
    samples.iter().map(|s| s.value).sum()
}

/// Round half-up to a non-negative integer unit
pub fn round_units(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        (value + 0.5).floor() as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_units_half_up() {
        assert_eq!(round_units(2.5), 3);
        assert_eq!(round_units(2.49), 2);
        assert_eq!(round_units(0.0), 0);
        assert_eq!(round_units(-3.2), 0);
        assert_eq!(round_units(f64::NAN), 0);
    }

    #[test]
    fn test_sum_values() {
        let samples = vec![
            Sample::new([("pod".to_string(), "a".to_string())], 1.5),
            Sample::new([("pod".to_string(), "b".to_string())], 2.0),
        ];
        assert_eq!(sum_values(&samples), 3.5);
        assert_eq!(samples[0].label("pod"), Some("a"));
        assert_eq!(samples[0].label("node"), None);
    }
}
