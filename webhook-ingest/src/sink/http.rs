//! Sink that forwards events to a downstream HTTP service.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{info, warn};
use url::Url;

use super::{DeliveryOutcome, Sink};
use crate::event::WebhookEvent;

/// Header carrying the delivery id on forwarded requests.
const DELIVERY_HEADER: &str = "x-webhook-delivery";

/// POSTs each event as JSON to a fixed URL.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: Client,
    url: Url,
}

impl HttpSink {
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, url })
    }
}

/// Map a downstream response status to a delivery outcome.
///
/// 408, 429 and 5xx are worth retrying; any other non-success is final.
pub fn classify_status(status: StatusCode) -> DeliveryOutcome {
    if status.is_success() {
        DeliveryOutcome::Accepted
    } else if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        DeliveryOutcome::TransientFailure(format!("downstream responded {status}"))
    } else {
        DeliveryOutcome::Rejected(format!("downstream responded {status}"))
    }
}

#[async_trait]
impl Sink for HttpSink {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn deliver(&self, event: WebhookEvent) -> DeliveryOutcome {
        let mut request = self.client.post(self.url.clone()).json(&event);
        if let Some(id) = event.delivery_id() {
            request = request.header(DELIVERY_HEADER, id);
        }

        match request.send().await {
            Ok(response) => {
                let outcome = classify_status(response.status());
                info!(
                    status = response.status().as_u16(),
                    delivery_id = ?event.delivery_id(),
                    accepted = outcome == DeliveryOutcome::Accepted,
                    "http_sink_response"
                );
                outcome
            }
            Err(e) => {
                warn!(
                    error = %e,
                    timeout = e.is_timeout(),
                    connect = e.is_connect(),
                    "http_sink_request_failed"
                );
                DeliveryOutcome::TransientFailure(format!("downstream request failed: {e}"))
            }
        }
    }
}
