//! Web server module for receiving webhooks.
//!
//! This module provides a thin axum layer that:
//! - Captures the method, headers and raw body of each delivery
//! - Runs it through the [`Endpoint`](crate::endpoint::Endpoint) pipeline
//! - Renders the resulting status with an empty body
//!
//! Authentication, parsing and forwarding all live in the endpoint.

pub mod handlers;

pub use handlers::{health, receive_webhook, router, AppState, HealthResponse};
