//! Prometheus client tests against a mock HTTP server

use chrono::{TimeZone, Utc};
use mockito::{Matcher, Server};
use std::time::Duration;
use steer_lib::telemetry::{PrometheusClient, PrometheusConfig, TelemetrySource};
use steer_lib::SteerError;

fn client(base_url: String) -> PrometheusClient {
    PrometheusClient::new(PrometheusConfig {
        base_url,
        timeout: Duration::from_secs(2),
    })
    .unwrap()
}

#[tokio::test]
async fn test_instant_query_sends_expression_and_time() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v1/query")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("query".into(), "up".into()),
            Matcher::UrlEncoded("time".into(), "1700000000.000".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"status":"success","data":{"resultType":"vector","result":[
                {"metric":{"node":"worker1"},"value":[1700000000,"4500000000"]}
            ]}}"#,
        )
        .create_async()
        .await;

    let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let samples = client(server.url()).query("up", at).await.unwrap();

    mock.assert_async().await;
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].label("node"), Some("worker1"));
    assert_eq!(samples[0].value, 4.5e9);
}

#[tokio::test]
async fn test_path_prefix_is_preserved() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/prometheus/api/v1/query")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"status":"success","data":{"resultType":"vector","result":[]}}"#)
        .create_async()
        .await;

    let samples = client(format!("{}/prometheus", server.url()))
        .query("up", Utc::now())
        .await
        .unwrap();

    mock.assert_async().await;
    assert!(samples.is_empty());
}

#[tokio::test]
async fn test_backend_error_is_telemetry_failure() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/v1/query")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"status":"error","errorType":"bad_data","error":"1:5: parse error"}"#)
        .create_async()
        .await;

    let err = client(server.url())
        .query("sum(", Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, SteerError::Telemetry(ref msg) if msg.contains("parse error")));
}

#[tokio::test]
async fn test_non_json_body_is_malformed() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/v1/query")
        .match_query(Matcher::Any)
        .with_status(502)
        .with_body("<html>bad gateway</html>")
        .create_async()
        .await;

    let err = client(server.url())
        .query("up", Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, SteerError::MalformedTelemetry { .. }));
}
