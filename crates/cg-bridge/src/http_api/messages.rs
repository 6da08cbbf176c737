use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Json,
};
use cg_session::{HistoryPage, SessionError};
use std::sync::Arc;
use tracing::info;

use crate::api_error::ApiError;
use crate::documents::DocumentInput;

use super::state::ApiState;
use super::types::{
    HistoryQuery, SendDocumentRequest, SendDocumentResponse, SendRequest, SendResponse,
};

pub(crate) const DEFAULT_HISTORY_LIMIT: usize = 50;

fn required(field: Option<String>) -> Option<String> {
    field.filter(|v| !v.trim().is_empty())
}

/// Fail fast with 503 before doing any work for a disconnected session.
async fn ensure_connected(state: &ApiState) -> Result<(), ApiError> {
    let snap = state.session.snapshot().await;
    if snap.connected {
        Ok(())
    } else {
        Err(ApiError::not_connected(snap.state))
    }
}

async fn map_send_error(state: &ApiState, err: SessionError, what: &str) -> ApiError {
    match err {
        SessionError::NotConnected => ApiError::not_connected(state.session.state().await),
        other => ApiError::Internal {
            message: format!("failed to send {what}"),
            details: other.to_string(),
        },
    }
}

/// POST /send -- send a text message.
pub(crate) async fn send_message(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<SendResponse>, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let (Some(to), Some(message)) = (required(req.to), required(req.message)) else {
        return Err(ApiError::BadRequest("fields required: to, message".into()));
    };

    ensure_connected(&state).await?;
    if let Err(e) = state.session.send(&to, &message).await {
        return Err(map_send_error(&state, e, "message").await);
    }

    info!(to = %to, "message sent");
    Ok(Json(SendResponse {
        success: true,
        to,
        timestamp: chrono::Utc::now(),
    }))
}

/// POST /send-document -- resolve a PDF from url/base64/path and send it.
pub(crate) async fn send_document(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<SendDocumentRequest>, JsonRejection>,
) -> Result<Json<SendDocumentResponse>, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let Some(to) = required(req.to) else {
        return Err(ApiError::BadRequest("field required: to".into()));
    };
    let input = DocumentInput::from_fields(req.url, req.base64, req.path, req.filename, req.message)?;

    ensure_connected(&state).await?;
    let document = state.documents.resolve(input).await?;
    let filename = document.filename.clone();
    let has_caption = document.caption.is_some();

    if let Err(e) = state
        .session
        .send_document(&to, &document.into_outbound())
        .await
    {
        return Err(map_send_error(&state, e, "document").await);
    }

    info!(to = %to, filename = %filename, "document sent");
    Ok(Json(SendDocumentResponse {
        success: true,
        filename,
        has_caption,
        timestamp: chrono::Utc::now(),
    }))
}

/// GET /history?limit=N -- most recent inbound messages, oldest first.
pub(crate) async fn get_history(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryPage> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Json(state.session.history(limit).await)
}
