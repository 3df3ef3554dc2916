//! Sink that publishes events to a durable AMQP queue.
//!
//! The connection is opened lazily on first delivery and re-established
//! whenever the channel is found disconnected.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions},
    publisher_confirm::Confirmation,
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use super::{DeliveryOutcome, Sink};
use crate::event::WebhookEvent;

/// AMQP publisher with connection management.
///
/// Cloning shares the underlying connection.
#[derive(Clone)]
pub struct AmqpSink {
    inner: Arc<AmqpSinkInner>,
}

struct AmqpSinkInner {
    url: String,
    queue: String,
    connection: RwLock<Option<Connection>>,
    channel: RwLock<Option<Channel>>,
}

impl AmqpSink {
    /// Create a sink for `queue` on the broker at `url`. Does not connect.
    pub fn new(url: String, queue: String) -> Self {
        Self {
            inner: Arc::new(AmqpSinkInner {
                url,
                queue,
                connection: RwLock::new(None),
                channel: RwLock::new(None),
            }),
        }
    }

    pub fn queue(&self) -> &str {
        &self.inner.queue
    }

    /// Ensure we have a valid connection and channel.
    async fn ensure_connected(&self) -> Result<Channel> {
        {
            let channel = self.inner.channel.read().await;
            if let Some(ch) = channel.as_ref() {
                if ch.status().connected() {
                    return Ok(ch.clone());
                }
            }
        }

        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        // Double-check after acquiring write lock
        if let Some(ch) = channel.as_ref() {
            if ch.status().connected() {
                return Ok(ch.clone());
            }
        }

        info!("amqp_sink_connecting");

        let conn = Connection::connect(&self.inner.url, ConnectionProperties::default())
            .await
            .context("Failed to connect to AMQP broker")?;

        let ch = conn
            .create_channel()
            .await
            .context("Failed to create channel")?;

        ch.confirm_select(ConfirmSelectOptions::default())
            .await
            .context("Failed to enable publisher confirms")?;

        ch.queue_declare(
            &self.inner.queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .context("Failed to declare queue")?;

        info!(queue = %self.inner.queue, "amqp_sink_connected");

        *connection = Some(conn);
        *channel = Some(ch.clone());

        Ok(ch)
    }

    async fn publish(&self, body: &[u8], message_id: &str) -> Result<Confirmation> {
        let channel = self.ensure_connected().await?;

        let confirmation = channel
            .basic_publish(
                "",
                &self.inner.queue,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default()
                    .with_delivery_mode(2) // Persistent
                    .with_content_type("application/json".into())
                    .with_message_id(message_id.to_string().into()),
            )
            .await
            .context("Failed to publish event")?
            .await
            .context("Failed to confirm publish")?;

        Ok(confirmation)
    }
}

#[async_trait]
impl Sink for AmqpSink {
    fn name(&self) -> &'static str {
        "amqp"
    }

    async fn deliver(&self, event: WebhookEvent) -> DeliveryOutcome {
        let body = match serde_json::to_vec(&event) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "amqp_sink_serialize_failed");
                return DeliveryOutcome::Rejected(format!("event cannot be encoded: {e}"));
            }
        };

        let message_id = event
            .delivery_id()
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        match self.publish(&body, &message_id).await {
            Ok(Confirmation::Nack(_)) => {
                warn!(message_id = %message_id, "amqp_sink_nacked");
                DeliveryOutcome::TransientFailure("broker did not accept the message".to_string())
            }
            Ok(_) => {
                info!(
                    queue = %self.inner.queue,
                    message_id = %message_id,
                    body_length = body.len(),
                    "amqp_sink_published"
                );
                DeliveryOutcome::Accepted
            }
            Err(e) => {
                warn!(error = %e, message_id = %message_id, "amqp_sink_publish_failed");
                DeliveryOutcome::TransientFailure(format!("{e:#}"))
            }
        }
    }

    /// Close the connection gracefully.
    async fn close(&self) {
        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        if let Some(ch) = channel.take() {
            if let Err(e) = ch.close(200, "Normal shutdown").await {
                warn!(error = %e, "amqp_channel_close_error");
            }
        }

        if let Some(conn) = connection.take() {
            if let Err(e) = conn.close(200, "Normal shutdown").await {
                warn!(error = %e, "amqp_connection_close_error");
            }
        }

        info!("amqp_sink_closed");
    }
}
