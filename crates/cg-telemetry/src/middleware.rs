use axum::{
    body::Body,
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::metrics::global_metrics;

/// Path label for requests that matched no route.
pub const UNMATCHED_PATH: &str = "unmatched";

/// Records `api_requests_total{method,path,status}`,
/// `api_request_duration_seconds` and, for 5xx responses,
/// `api_server_errors_total{path}`.
///
/// `path` is the route template, so `/foo?x=1` and requests for unknown paths
/// don't create new series.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().as_str().to_owned();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| UNMATCHED_PATH.to_owned());
    let start = Instant::now();

    let response = next.run(request).await;

    let elapsed = start.elapsed().as_secs_f64();
    let status = response.status();
    let m = global_metrics();
    m.increment_counter(
        "api_requests_total",
        &[("method", &method), ("path", &path), ("status", status.as_str())],
    );
    if status.is_server_error() {
        m.increment_counter("api_server_errors_total", &[("path", &path)]);
    }
    m.record_histogram("api_request_duration_seconds", elapsed);

    response
}
