//! Query expressions issued against the telemetry backend

use std::time::Duration;

/// Label carrying the calling service on mesh request metrics
pub const SOURCE_SERVICE_LABEL: &str = "source_canonical_service";
/// Label carrying the called service on mesh request metrics
pub const DESTINATION_SERVICE_LABEL: &str = "destination_canonical_service";
/// Label carrying a node name on the hardware-speed gauge
pub const NODE_LABEL: &str = "node";
/// Fallback label for the hardware-speed gauge when no node label is attached
pub const INSTANCE_LABEL: &str = "instance";

/// Render a window as whole seconds, at least one
pub fn window(duration: Duration) -> String {
    format!("{}s", duration.as_secs().max(1))
}

/// Escape a label value for use inside a double-quoted matcher
pub fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Observed component-to-component request pairs in a namespace
pub fn dependency_edges(namespace: &str, duration: Duration) -> String {
    format!(
        r#"sum(increase(istio_requests_total{{kubernetes_namespace="{}"}}[{}])) by ({}, {})"#,
        escape(namespace),
        window(duration),
        SOURCE_SERVICE_LABEL,
        DESTINATION_SERVICE_LABEL
    )
}

/// CPU seconds per second consumed by one replica
pub fn replica_cpu_rate(namespace: &str, replica: &str, duration: Duration) -> String {
    format!(
        r#"sum(rate(container_cpu_usage_seconds_total{{namespace="{}", pod="{}"}}[{}]))"#,
        escape(namespace),
        escape(replica),
        window(duration)
    )
}

/// Requests received by one replica from one source component
pub fn edge_request_increase(
    namespace: &str,
    source_component: &str,
    replica: &str,
    duration: Duration,
) -> String {
    format!(
        r#"sum(increase(istio_requests_total{{kubernetes_namespace="{}", kubernetes_pod_name="{}", {}="{}", reporter="destination"}}[{}]))"#,
        escape(namespace),
        escape(replica),
        SOURCE_SERVICE_LABEL,
        escape(source_component),
        window(duration)
    )
}

/// Summed request duration (ms) observed by one replica from one source component
pub fn edge_duration_increase(
    namespace: &str,
    source_component: &str,
    replica: &str,
    duration: Duration,
) -> String {
    format!(
        r#"sum(increase(istio_request_duration_milliseconds_sum{{kubernetes_namespace="{}", kubernetes_pod_name="{}", {}="{}", reporter="destination"}}[{}]))"#,
        escape(namespace),
        escape(replica),
        SOURCE_SERVICE_LABEL,
        escape(source_component),
        window(duration)
    )
}

/// Maximum clock frequency of each node, in hertz
pub fn node_clock_speed() -> String {
    r#"node_cpu_frequency_max_hertz{cpu="0"}"#.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_rendering() {
        assert_eq!(window(Duration::from_secs(15)), "15s");
        assert_eq!(window(Duration::from_millis(200)), "1s");
    }

    #[test]
    fn test_escape_quotes() {
        assert_eq!(escape(r#"a"b"#), r#"a\"b"#);
    }

    #[test]
    fn test_dependency_query() {
        assert_eq!(
            dependency_edges("shop", Duration::from_secs(30)),
            r#"sum(increase(istio_requests_total{kubernetes_namespace="shop"}[30s])) by (source_canonical_service, destination_canonical_service)"#
        );
    }

    #[test]
    fn test_edge_queries_filter_source_and_replica() {
        let q = edge_request_increase("shop", "frontend", "cart-0", Duration::from_secs(15));
        assert!(q.contains(r#"kubernetes_pod_name="cart-0""#));
        assert!(q.contains(r#"source_canonical_service="frontend""#));
        assert!(q.contains("[15s]"));

        let d = edge_duration_increase("shop", "frontend", "cart-0", Duration::from_secs(15));
        assert!(d.starts_with("sum(increase(istio_request_duration_milliseconds_sum{"));
    }
}
