//! HTTP API error types.
//!
//! Every failure leaves the API as `{"error": "<message>"}` plus, where it
//! helps the caller, the current connection `state` or failure `details`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cg_core::types::ConnectionState;
use serde_json::json;
use thiserror::Error;

use crate::documents::DocumentError;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {message}")]
    NotFound {
        message: String,
        state: Option<ConnectionState>,
    },

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("upstream failure: {0}")]
    BadGateway(String),

    /// The session is not in a state that allows the operation.
    #[error("{message}")]
    ServiceUnavailable {
        message: String,
        state: ConnectionState,
    },

    #[error("{message}: {details}")]
    Internal { message: String, details: String },
}

impl ApiError {
    pub fn not_connected(state: ConnectionState) -> Self {
        ApiError::ServiceUnavailable {
            message: "chat session is not connected".into(),
            state,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DocumentError> for ApiError {
    fn from(err: DocumentError) -> Self {
        let message = err.to_string();
        match err {
            DocumentError::NoSourceProvided
            | DocumentError::InvalidEncoding(_)
            | DocumentError::InvalidFormat => ApiError::BadRequest(message),
            DocumentError::PathNotAllowed(_) => ApiError::Forbidden(message),
            DocumentError::NotFound(_) => ApiError::NotFound {
                message,
                state: None,
            },
            DocumentError::TooLarge { .. } => ApiError::PayloadTooLarge(message),
            DocumentError::FetchFailed(_) => ApiError::BadGateway(message),
        }
    }
}

// ---------------------------------------------------------------------------
// IntoResponse implementation
// ---------------------------------------------------------------------------

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Unauthorized => json!({ "error": "unauthorized" }),
            ApiError::NotFound {
                message,
                state: Some(state),
            } => json!({ "error": message, "state": state }),
            ApiError::NotFound { message, state: None } => json!({ "error": message }),
            ApiError::ServiceUnavailable { message, state } => {
                json!({ "error": message, "state": state })
            }
            ApiError::Internal { message, details } => {
                json!({ "error": message, "details": details })
            }
            ApiError::BadRequest(msg)
            | ApiError::Forbidden(msg)
            | ApiError::PayloadTooLarge(msg)
            | ApiError::BadGateway(msg) => json!({ "error": msg }),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
