//! The webhook ingestion pipeline.
//!
//! ```text
//! Received → Authenticated → Parsed → Forwarded → Responded
//!     │            │            │          │
//!     └────────────┴────────────┴──────────┴──→ Rejected (401 / 400 / 422 / 503)
//! ```
//!
//! [`Endpoint::handle`] is independent of the HTTP framework; the axum
//! handlers in [`crate::web`] only capture the request and render the
//! response.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderName, Method, StatusCode};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::auth::Authenticator;
use crate::config::Config;
use crate::dedup::DeliveryStore;
use crate::error::IngestError;
use crate::event::{parse_payload, BodyFormat, InboundRequest, WebhookEvent};
use crate::sink::{DeliveryOutcome, Sink};

/// Status and (always empty) body returned for a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: StatusCode,
    /// Seconds the sender should wait before retrying, set only for 503.
    pub retry_after: Option<u64>,
}

impl WebhookResponse {
    pub fn ok() -> Self {
        Self {
            status: StatusCode::OK,
            retry_after: None,
        }
    }

    pub fn from_error(err: &IngestError, retry_after_secs: u64) -> Self {
        Self {
            status: err.status_code(),
            retry_after: err.is_retryable().then_some(retry_after_secs),
        }
    }
}

/// What happened to an authenticated, well-formed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Forwarded {
    Delivered,
    Duplicate,
}

/// Authenticates, parses, deduplicates and forwards webhook deliveries.
pub struct Endpoint {
    authenticator: Authenticator,
    sink: Arc<dyn Sink>,
    store: Option<Arc<dyn DeliveryStore>>,
    delivery_header: HeaderName,
    default_format: BodyFormat,
    forward_timeout: Duration,
    retry_after_secs: u64,
}

impl Endpoint {
    /// Build an endpoint. Without a store, delivery ids are ignored.
    pub fn new(
        config: &Config,
        sink: Arc<dyn Sink>,
        store: Option<Arc<dyn DeliveryStore>>,
    ) -> Self {
        Self {
            authenticator: Authenticator::new(
                config.secret.clone(),
                config.secret_header.clone(),
                config.auth_mode,
            ),
            sink,
            store,
            delivery_header: config.delivery_header.clone(),
            default_format: config.default_format,
            forward_timeout: config.forward_timeout,
            retry_after_secs: config.retry_after_secs,
        }
    }

    /// Run one delivery through the pipeline and pick the response.
    ///
    /// Never panics and never fails: every error resolves to a status code.
    pub async fn handle(&self, request: InboundRequest) -> WebhookResponse {
        let delivery_id = request.header_str(&self.delivery_header).map(str::to_string);

        debug!(
            method = %request.method(),
            path = %request.path(),
            delivery_id = ?delivery_id,
            body_length = request.body().len(),
            "webhook_received"
        );

        match self.process(&request, delivery_id.clone()).await {
            Ok(Forwarded::Delivered) => {
                info!(delivery_id = ?delivery_id, sink = self.sink.name(), "webhook_forwarded");
                WebhookResponse::ok()
            }
            Ok(Forwarded::Duplicate) => {
                info!(delivery_id = ?delivery_id, "webhook_duplicate_skipped");
                WebhookResponse::ok()
            }
            Err(err) => {
                let response = WebhookResponse::from_error(&err, self.retry_after_secs);
                match &err {
                    IngestError::SinkUnavailable(_) => warn!(
                        error = %err,
                        delivery_id = ?delivery_id,
                        status = response.status.as_u16(),
                        "webhook_deferred"
                    ),
                    _ => info!(
                        error = %err,
                        delivery_id = ?delivery_id,
                        status = response.status.as_u16(),
                        "webhook_rejected"
                    ),
                }
                response
            }
        }
    }

    async fn process(
        &self,
        request: &InboundRequest,
        delivery_id: Option<String>,
    ) -> Result<Forwarded, IngestError> {
        if request.method() != Method::POST {
            return Err(IngestError::MethodNotAllowed(request.method().to_string()));
        }

        let proof = self.authenticator.verify(request.headers(), request.body())?;

        let format = BodyFormat::from_headers(request.headers()).unwrap_or(self.default_format);
        let payload = parse_payload(format, request.body())?;

        let store = match (&self.store, &delivery_id) {
            (Some(store), Some(id)) => {
                if self.already_forwarded(store.as_ref(), id).await? {
                    return Ok(Forwarded::Duplicate);
                }
                Some((store, id.clone()))
            }
            _ => None,
        };

        let event = WebhookEvent::new(proof, delivery_id, request.received_at(), format, payload);

        let outcome = timeout(self.forward_timeout, self.sink.deliver(event))
            .await
            .map_err(|_| {
                IngestError::SinkUnavailable(format!(
                    "sink did not respond within {}ms",
                    self.forward_timeout.as_millis()
                ))
            })?;

        match outcome {
            DeliveryOutcome::Accepted => {}
            DeliveryOutcome::Rejected(reason) => return Err(IngestError::SinkRejection(reason)),
            DeliveryOutcome::TransientFailure(reason) => {
                return Err(IngestError::SinkUnavailable(reason))
            }
        }

        if let Some((store, id)) = store {
            // The event is already with the sink; failing to record it only
            // weakens deduplication for a later retry.
            match timeout(self.forward_timeout, store.mark_seen(&id)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, delivery_id = %id, "delivery_mark_failed"),
                Err(_) => warn!(delivery_id = %id, "delivery_mark_timed_out"),
            }
        }

        Ok(Forwarded::Delivered)
    }

    async fn already_forwarded(
        &self,
        store: &dyn DeliveryStore,
        delivery_id: &str,
    ) -> Result<bool, IngestError> {
        match timeout(self.forward_timeout, store.seen(delivery_id)).await {
            Ok(Ok(seen)) => Ok(seen),
            Ok(Err(e)) => Err(IngestError::SinkUnavailable(e.to_string())),
            Err(_) => Err(IngestError::SinkUnavailable(format!(
                "delivery store did not respond within {}ms",
                self.forward_timeout.as_millis()
            ))),
        }
    }
}
