//! Bounded per-replica telemetry history
//!
//! Owned by the caller and passed into the aggregator. Each replica keeps at
//! most `retention` snapshots; the oldest is evicted first.

use crate::models::Replica;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

/// Signals of one replica at one point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplicaSnapshot {
    pub recorded_at: DateTime<Utc>,
    pub cpu_utilization: u32,
    pub request_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_latency_ms: Option<u64>,
    pub clock_speed: f64,
}

impl ReplicaSnapshot {
    pub fn of(replica: &Replica, recorded_at: DateTime<Utc>) -> Self {
        Self {
            recorded_at,
            cpu_utilization: replica.cpu_utilization,
            request_count: replica.request_count,
            request_latency_ms: replica.request_latency_ms,
            clock_speed: replica.clock_speed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryHistory {
    retention: usize,
    entries: HashMap<String, VecDeque<ReplicaSnapshot>>,
}

impl TelemetryHistory {
    /// A retention of zero is treated as one
    pub fn new(retention: usize) -> Self {
        Self {
            retention: retention.max(1),
            entries: HashMap::new(),
        }
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    pub fn record(&mut self, replica: &Replica, at: DateTime<Utc>) {
        let retention = self.retention;
        let snapshots = self
            .entries
            .entry(replica.name.clone())
            .or_insert_with(|| VecDeque::with_capacity(retention.min(128)));
        while snapshots.len() >= retention {
            snapshots.pop_front();
        }
        snapshots.push_back(ReplicaSnapshot::of(replica, at));
    }

    /// Up to `count` most recent snapshots, oldest first
    pub fn recent(&self, replica: &str, count: usize) -> Vec<&ReplicaSnapshot> {
        self.entries
            .get(replica)
            .map(|snapshots| {
                let skip = snapshots.len().saturating_sub(count);
                snapshots.iter().skip(skip).collect()
            })
            .unwrap_or_default()
    }

    pub fn latest(&self, replica: &str) -> Option<&ReplicaSnapshot> {
        self.entries.get(replica)?.back()
    }

    /// Mean CPU utilization over the last `last_n` snapshots
    pub fn average_cpu(&self, replica: &str, last_n: usize) -> Option<f64> {
        let recent = self.recent(replica, last_n);
        if recent.is_empty() {
            return None;
        }
        let total: u64 = recent.iter().map(|s| s.cpu_utilization as u64).sum();
        Some(total as f64 / recent.len() as f64)
    }

    /// Total snapshots across all replicas
    pub fn len(&self) -> usize {
        self.entries.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(VecDeque::is_empty)
    }

    pub fn replica_count(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
