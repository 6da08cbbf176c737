use axum::{extract::State, response::Html, Json};
use std::sync::Arc;

use super::state::ApiState;
use super::types::HealthResponse;

const INDEX_HTML: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>chatgate</title></head>
<body>
<h1>chatgate</h1>
<ul>
  <li><b>GET</b> /health</li>
  <li><b>GET</b> /status</li>
  <li><b>GET</b> /pairing?format=json|image (login required)</li>
  <li><b>POST</b> /send</li>
  <li><b>POST</b> /send-document</li>
  <li><b>GET</b> /history?limit=N</li>
  <li><b>POST</b> /session/logout</li>
  <li><b>GET</b> /metrics</li>
  <li><a href="/login">/login</a></li>
</ul>
<p>API requests need the <code>X-API-Key</code> header.</p>
</body>
</html>
"#;

/// GET / -- endpoint index.
pub(crate) async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /health -- liveness plus the connection state. No auth.
pub(crate) async fn health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        uptime: state.start_time.elapsed().as_secs_f64(),
        connection_state: state.session.state().await,
    })
}
