//! Error types for the steering pipeline
//!
//! Every failure is surfaced to the caller; nothing in the pipeline retries.

use thiserror::Error;

pub type Result<T, E = SteerError> = std::result::Result<T, E>;

/// Coarse classification used by callers to pick a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Telemetry or topology backend failed or returned malformed data
    Upstream,
    /// Input violates a structural precondition (cycle, empty component)
    Precondition,
    /// Caller supplied an invalid argument
    Input,
}

#[derive(Debug, Error)]
pub enum SteerError {
    #[error("telemetry query failed: {0}")]
    Telemetry(String),

    #[error("malformed telemetry response for `{query}`: {reason}")]
    MalformedTelemetry { query: String, reason: String },

    #[error("topology resolution failed for namespace `{namespace}`: {reason}")]
    Topology { namespace: String, reason: String },

    #[error("dependency graph contains a cycle through `{component}`: {}", path.join(" -> "))]
    CyclicGraph { component: String, path: Vec<String> },

    #[error("component `{component}` has no resolvable replicas")]
    EmptyComponent { component: String },

    #[error("component `{0}` is not present in the replica catalog")]
    UnknownComponent(String),

    #[error("traffic-split plan violates its invariant at {source_component} -> {destination_component} ({source_replica}): {reason}")]
    InvalidPlan {
        source_component: String,
        destination_component: String,
        source_replica: String,
        reason: String,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl SteerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SteerError::Telemetry(_)
            | SteerError::MalformedTelemetry { .. }
            | SteerError::Topology { .. } => ErrorKind::Upstream,
            SteerError::CyclicGraph { .. }
            | SteerError::EmptyComponent { .. }
            | SteerError::UnknownComponent(_)
            | SteerError::InvalidPlan { .. } => ErrorKind::Precondition,
            SteerError::InvalidArgument(_) => ErrorKind::Input,
        }
    }
}

impl From<reqwest::Error> for SteerError {
    fn from(err: reqwest::Error) -> Self {
        SteerError::Telemetry(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(SteerError::Telemetry("down".into()).kind(), ErrorKind::Upstream);
        assert_eq!(
            SteerError::EmptyComponent {
                component: "cart".into()
            }
            .kind(),
            ErrorKind::Precondition
        );
        assert_eq!(
            SteerError::InvalidArgument("window".into()).kind(),
            ErrorKind::Input
        );
    }

    #[test]
    fn test_cycle_message_lists_path() {
        let err = SteerError::CyclicGraph {
            component: "a".into(),
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(
            err.to_string(),
            "dependency graph contains a cycle through `a`: a -> b -> a"
        );
    }
}
