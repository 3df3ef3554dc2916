//! Sink that only logs what it receives.

use async_trait::async_trait;
use tracing::{info, trace};

use super::{DeliveryOutcome, Sink};
use crate::event::WebhookEvent;

/// Logs event metadata and accepts every event.
///
/// The payload itself is only emitted at trace level.
#[derive(Debug, Default, Clone)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Sink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, event: WebhookEvent) -> DeliveryOutcome {
        info!(
            delivery_id = ?event.delivery_id(),
            received_at = %event.received_at(),
            format = %event.format(),
            field_count = event.payload().len(),
            "webhook_event_received"
        );
        trace!(payload = ?event.payload(), "webhook_event_payload");

        DeliveryOutcome::Accepted
    }
}
