use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::{middleware, routing::get, Router};
use cg_telemetry::logging;
use cg_telemetry::metrics::{global_metrics, MetricsCollector};
use cg_telemetry::middleware::metrics_middleware;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Metrics Collector
// ---------------------------------------------------------------------------

#[test]
fn test_counter_increment() {
    let m = MetricsCollector::new();
    assert_eq!(m.get_counter("messages_sent_total", &[("kind", "text")]), 0);

    m.increment_counter("messages_sent_total", &[("kind", "text")]);
    m.increment_counter("messages_sent_total", &[("kind", "text")]);
    m.increment_counter("messages_sent_total", &[("kind", "document")]);

    assert_eq!(m.get_counter("messages_sent_total", &[("kind", "text")]), 2);
    assert_eq!(m.get_counter("messages_sent_total", &[("kind", "document")]), 1);
}

#[test]
fn test_counter_increment_by() {
    let m = MetricsCollector::new();
    m.increment_counter_by("bytes", &[], 100);
    m.increment_counter_by("bytes", &[], 0);
    m.increment_counter_by("bytes", &[], 23);
    assert_eq!(m.get_counter("bytes", &[]), 123);
}

#[test]
fn test_gauge_set() {
    let m = MetricsCollector::new();
    assert_eq!(m.get_gauge("session_connected"), 0);
    m.set_gauge("session_connected", 1);
    assert_eq!(m.get_gauge("session_connected"), 1);
    m.set_gauge("session_connected", 0);
    assert_eq!(m.get_gauge("session_connected"), 0);
}

#[test]
fn test_prometheus_export() {
    let m = MetricsCollector::new();
    m.increment_counter("session_transitions_total", &[("state", "connected")]);
    m.set_gauge("session_connected", 1);
    m.record_histogram("api_request_duration_seconds", 0.1);

    let output = m.export_prometheus();
    assert!(output.contains("# TYPE session_transitions_total counter"));
    assert!(output.contains("session_transitions_total{state=\"connected\"} 1"));
    assert!(output.contains("# TYPE session_connected gauge"));
    assert!(output.contains("session_connected 1"));
    assert!(output.contains("# TYPE api_request_duration_seconds histogram"));
    assert!(output.contains("api_request_duration_seconds_count 1"));
}

#[test]
fn test_global_metrics_singleton() {
    assert!(std::ptr::eq(global_metrics(), global_metrics()));
}

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_metrics_middleware_counts_requests() {
    let app = Router::new()
        .route("/telemetry-ok", get(|| async { "ok" }))
        .layer(middleware::from_fn(metrics_middleware));

    let before = global_metrics().get_counter(
        "api_requests_total",
        &[("method", "GET"), ("path", "/telemetry-ok"), ("status", "200")],
    );

    let req = Request::builder()
        .uri("/telemetry-ok")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let after = global_metrics().get_counter(
        "api_requests_total",
        &[("method", "GET"), ("path", "/telemetry-ok"), ("status", "200")],
    );
    assert_eq!(after, before + 1);
    assert!(global_metrics().histogram_count("api_request_duration_seconds") >= 1);
}

#[tokio::test]
async fn test_metrics_middleware_labels_by_route_template() {
    let app = Router::new()
        .route(
            "/telemetry-fail/{id}",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        )
        .layer(middleware::from_fn(metrics_middleware));

    let template = "/telemetry-fail/{id}";
    let before = global_metrics().get_counter("api_server_errors_total", &[("path", template)]);

    for id in ["a", "b"] {
        let req = Request::builder()
            .uri(format!("/telemetry-fail/{id}"))
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    let after = global_metrics().get_counter("api_server_errors_total", &[("path", template)]);
    assert_eq!(after, before + 2);
    assert_eq!(
        global_metrics().get_counter(
            "api_requests_total",
            &[("method", "GET"), ("path", "/telemetry-fail/a"), ("status", "500")],
        ),
        0
    );
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[test]
fn test_init_logging_is_idempotent() {
    // Second call is a safe no-op.
    logging::init_logging("test-service", "debug");
    logging::init("test-service", "info", true);
    tracing::info!(key = "value", "log line");
}
