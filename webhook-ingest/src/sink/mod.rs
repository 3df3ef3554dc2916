//! Downstream sinks.
//!
//! A sink is the single hand-off point for validated events. All business
//! handling of the payload happens behind it.
//!
//! ```text
//! Endpoint → Sink::deliver(WebhookEvent) → DeliveryOutcome
//! ```

pub mod amqp;
pub mod http;
pub mod log;

use async_trait::async_trait;

use crate::event::WebhookEvent;

pub use amqp::AmqpSink;
pub use http::HttpSink;
pub use log::LogSink;

/// Result of handing an event to a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The sink took ownership of the event.
    Accepted,
    /// The sink refused the event permanently.
    Rejected(String),
    /// The sink could not take the event right now; redelivery may succeed.
    TransientFailure(String),
}

#[async_trait]
pub trait Sink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Hand off one event. Ownership transfers to the sink.
    async fn deliver(&self, event: WebhookEvent) -> DeliveryOutcome;

    /// Release connections on shutdown.
    async fn close(&self) {}
}
