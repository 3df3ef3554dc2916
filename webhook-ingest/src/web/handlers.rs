//! Webhook endpoint handlers.
//!
//! These handlers only translate between axum and the framework-independent
//! [`Endpoint`]; they never inspect the payload themselves.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, HeaderValue, Method, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::endpoint::{Endpoint, WebhookResponse};
use crate::event::InboundRequest;
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub endpoint: Arc<Endpoint>,
}

impl AppState {
    pub fn new(config: Config, endpoint: Endpoint) -> Self {
        Self {
            config: Arc::new(config),
            endpoint: Arc::new(endpoint),
        }
    }
}

/// Build the router: the webhook route, `/health`, body limit and tracing.
pub fn router(state: AppState) -> Router {
    let path = state.config.path.clone();
    let max_body_bytes = state.config.max_body_bytes;

    Router::new()
        .route("/health", get(health))
        .route(&path, post(receive_webhook))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Webhook
// =============================================================================

impl IntoResponse for WebhookResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = self.status;

        if let Some(secs) = self.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }

        response
    }
}

/// Webhook endpoint.
///
/// The raw body is taken as bytes so signature verification sees exactly
/// what the sender signed.
pub async fn receive_webhook(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResponse {
    let request = InboundRequest::new(method, uri.path(), headers, body);
    state.endpoint.handle(request).await
}
