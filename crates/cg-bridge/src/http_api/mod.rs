// ---------------------------------------------------------------------------
// HTTP API module directory
// ---------------------------------------------------------------------------
//
// Handlers are grouped by concern; this file owns the router and the
// middleware stack.

mod login;
mod messages;
mod metrics;
mod pages;
mod session;
pub mod state;
pub mod types;

pub use state::ApiState;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use cg_telemetry::middleware::metrics_middleware;
use cg_telemetry::tracing_setup::request_id_middleware;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;

use crate::auth::AuthLayer;

/// Build the full router.
///
/// `/`, `/health`, the login pages and `/pairing` (which has its own
/// session-token guard) are public; everything else requires the API key.
pub fn api_router(state: Arc<ApiState>) -> Router {
    let protected = Router::new()
        .route("/status", get(session::get_status))
        .route("/send", post(messages::send_message))
        .route("/send-document", post(messages::send_document))
        .route("/history", get(messages::get_history))
        .route("/session/logout", post(session::logout_session))
        .route("/metrics", get(metrics::get_metrics_prometheus))
        .layer(AuthLayer::new(state.api_key.clone()));

    let public = Router::new()
        .route("/", get(pages::index))
        .route("/health", get(pages::health))
        .route("/pairing", get(session::get_pairing))
        .route("/login", get(login::login_page).post(login::login_submit))
        .route("/logout", get(login::logout));

    public
        .merge(protected)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.body_limit))
        .layer(axum_middleware::from_fn(metrics_middleware))
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}
