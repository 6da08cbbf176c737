use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api_error::ApiError;
use crate::session_guard::PairingAccess;

use super::state::ApiState;
use super::types::{LogoutResponse, PairingQuery, PairingResponse, StatusResponse};

/// GET /status -- connection snapshot.
pub(crate) async fn get_status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    let snap = state.session.snapshot().await;
    Json(StatusResponse {
        state: snap.state,
        connected: snap.connected,
        pairing_available: snap.pairing_credential_available,
        reconnect_attempts: snap.reconnect_attempts,
        fault: snap.fault,
    })
}

/// GET /pairing?format=json|image -- the live pairing credential.
pub(crate) async fn get_pairing(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<PairingQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let snap = state.session.snapshot().await;
    match state.guard.authorize(snap.connected, &headers)? {
        PairingAccess::AlreadyConnected => {
            return Ok(Json(json!({
                "message": "session already connected; no pairing credential to show",
                "state": snap.state,
            }))
            .into_response());
        }
        PairingAccess::Granted { subject } => {
            info!(user = %subject, "pairing credential requested");
        }
    }

    let credential = state
        .session
        .pairing_credential()
        .await
        .ok_or_else(|| ApiError::NotFound {
            message: "pairing credential not available".into(),
            state: Some(snap.state),
        })?;

    match query.format.as_deref().unwrap_or("json") {
        "json" => Ok(Json(PairingResponse {
            image: credential.data_uri(),
            credential: credential.raw,
            state: snap.state,
        })
        .into_response()),
        "image" => {
            if credential.image.is_empty() {
                return Err(ApiError::NotFound {
                    message: "pairing image not available".into(),
                    state: Some(snap.state),
                });
            }
            Ok((
                [(header::CONTENT_TYPE, credential.content_type)],
                credential.image,
            )
                .into_response())
        }
        other => Err(ApiError::BadRequest(format!(
            "unknown format {other:?}; expected json or image"
        ))),
    }
}

/// POST /session/logout -- tear down, wipe credentials, re-pair shortly after.
pub(crate) async fn logout_session(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<LogoutResponse>, ApiError> {
    let result = state.session.logout().await;

    // Local state is already reset, so restart even if the client call failed.
    // A later logout replaces this restart.
    let delay = state.restart_delay;
    state.session.restart_after(delay).await;

    match result {
        Ok(()) => Ok(Json(LogoutResponse {
            success: true,
            message: "session logged out".into(),
            restart_in_ms: delay.as_millis() as u64,
        })),
        Err(e) => {
            warn!(error = %e, "logout incomplete");
            Err(ApiError::Internal {
                message: "logout failed".into(),
                details: e.to_string(),
            })
        }
    }
}
