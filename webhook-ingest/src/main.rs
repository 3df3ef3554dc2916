//! Webhook ingestion server.
//!
//! Loads configuration from the environment, wires the configured sink and
//! delivery store into the endpoint and serves it until SIGINT/SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ingest::web::{router, AppState};
use ingest::{
    AmqpSink, Config, DeliveryStore, Endpoint, HttpSink, InMemoryDeliveryStore, LogSink, Sink,
    SinkConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("webhook_server_starting");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "config_invalid");
            return Err(e).context("Failed to load configuration");
        }
    };
    info!(
        port = config.port,
        path = %config.path,
        secret_header = %config.secret_header,
        auth_mode = %config.auth_mode,
        delivery_header = %config.delivery_header,
        default_format = %config.default_format,
        forward_timeout_ms = config.forward_timeout.as_millis() as u64,
        dedup_retention_secs = config.dedup_retention.as_secs(),
        max_body_bytes = config.max_body_bytes,
        sink = config.sink.kind(),
        "config_loaded"
    );

    let sink = build_sink(&config)?;

    let store: Option<Arc<dyn DeliveryStore>> = if config.dedup_retention.is_zero() {
        None
    } else {
        Some(Arc::new(InMemoryDeliveryStore::new(config.dedup_retention)))
    };

    let endpoint = Endpoint::new(&config, sink.clone(), store);
    let state = AppState::new(config.clone(), endpoint);
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "webhook_server_listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sink.close().await;

    info!("webhook_server_shutdown_complete");

    Ok(())
}

fn build_sink(config: &Config) -> Result<Arc<dyn Sink>> {
    let sink: Arc<dyn Sink> = match &config.sink {
        SinkConfig::Log => Arc::new(LogSink::new()),
        SinkConfig::Http { url } => Arc::new(HttpSink::new(url.clone(), config.forward_timeout)?),
        SinkConfig::Amqp { url, queue } => Arc::new(AmqpSink::new(url.clone(), queue.clone())),
    };

    info!(sink = sink.name(), "sink_created");

    Ok(sink)
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("webhook_server_shutting_down");
}
