//! API key authentication middleware.
//!
//! Every request through the layer must carry the configured key via the
//! `X-API-Key` header, an `Authorization: Bearer <key>` header, or the
//! `apiKey` query parameter. There is no pass-through mode.

use axum::{
    body::Body,
    http::{Request, Response},
    response::IntoResponse,
};
use std::sync::Arc;
use std::task::{Context, Poll};
use subtle::ConstantTimeEq;
use tower::{Layer, Service};
use tracing::debug;

use crate::api_error::ApiError;

/// Query parameter accepted in place of the header.
pub const API_KEY_QUERY_PARAM: &str = "apiKey";

/// Pull the caller-supplied key out of a request, header first.
pub fn extract_api_key<B>(req: &Request<B>) -> Option<String> {
    let headers = req.headers();
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::to_string)
        })
        .or_else(|| {
            req.uri().query().and_then(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .find(|(k, _)| k == API_KEY_QUERY_PARAM)
                    .map(|(_, v)| v.into_owned())
            })
        })
}

/// Constant-time comparison of a supplied key against the expected one.
pub fn key_matches(provided: &str, expected: &str) -> bool {
    bool::from(provided.as_bytes().ct_eq(expected.as_bytes()))
}

// ---------------------------------------------------------------------------
// AuthLayer
// ---------------------------------------------------------------------------

/// A [`tower::Layer`] that wraps services with [`AuthMiddleware`].
#[derive(Clone)]
pub struct AuthLayer {
    api_key: Arc<String>,
}

impl AuthLayer {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Arc::new(api_key.into()),
        }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            api_key: self.api_key.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// AuthMiddleware
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    api_key: Arc<String>,
}

impl<S> Service<Request<Body>> for AuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let expected = self.api_key.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match extract_api_key(&req) {
                Some(ref key) if key_matches(key, &expected) => inner.call(req).await,
                provided => {
                    debug!(
                        path = %req.uri().path(),
                        key_present = provided.is_some(),
                        "api key rejected"
                    );
                    Ok(ApiError::Unauthorized.into_response())
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
