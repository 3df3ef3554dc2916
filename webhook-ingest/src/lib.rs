//! Webhook ingestion endpoint.
//!
//! Receives webhook deliveries over HTTP, verifies them against a shared
//! secret or HMAC signature, decodes the body and hands each event to a
//! downstream sink exactly once per delivery id.
//!
//! ## Architecture
//!
//! ```text
//! Sender → POST /webhook → auth → parse → dedup → Sink (log | http | amqp)
//!                  ↑                                   │
//!                  └──── 200 / 400 / 401 / 422 / 503 ──┘
//! ```

pub mod auth;
pub mod config;
pub mod dedup;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod sink;
pub mod web;

// Re-export commonly used types
pub use auth::{AuthMode, Authenticator};
pub use config::{Config, SinkConfig, WebhookSecret};
pub use dedup::{DeliveryStore, InMemoryDeliveryStore, StoreError};
pub use endpoint::{Endpoint, WebhookResponse};
pub use error::{ConfigError, IngestError};
pub use event::{BodyFormat, InboundRequest, WebhookEvent};
pub use sink::{AmqpSink, DeliveryOutcome, HttpSink, LogSink, Sink};
pub use web::AppState;
