use axum::response::IntoResponse;

use cg_telemetry::metrics::global_metrics;

/// GET /metrics -- Prometheus text exposition.
pub(crate) async fn get_metrics_prometheus() -> impl IntoResponse {
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        global_metrics().export_prometheus(),
    )
}
