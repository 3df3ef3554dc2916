//! Shared helpers for router-level tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;

use ingest::web::{router, AppState};
use ingest::{Config, DeliveryOutcome, Endpoint, InMemoryDeliveryStore, Sink, WebhookEvent};

pub const SECRET: &str = "mysecret";

/// Sink that records every event and answers with a fixed outcome,
/// optionally after a delay.
pub struct RecordingSink {
    outcome: DeliveryOutcome,
    delay: Option<Duration>,
    calls: AtomicUsize,
    events: Mutex<Vec<WebhookEvent>>,
}

impl RecordingSink {
    pub fn new(outcome: DeliveryOutcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            delay: None,
            calls: AtomicUsize::new(0),
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn accepting() -> Arc<Self> {
        Self::new(DeliveryOutcome::Accepted)
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            outcome: DeliveryOutcome::Accepted,
            delay: Some(delay),
            calls: AtomicUsize::new(0),
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<WebhookEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn deliver(&self, event: WebhookEvent) -> DeliveryOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.events.lock().unwrap().push(event);
        self.outcome.clone()
    }
}

/// Configuration with the test secret plus any overrides.
pub fn config(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("WEBHOOK_SECRET".to_string(), SECRET.to_string()),
        ("FORWARD_TIMEOUT_MS".to_string(), "200".to_string()),
        ("MAX_BODY_BYTES".to_string(), "4096".to_string()),
    ]);
    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(|name| vars.get(name).cloned()).unwrap()
}

/// Router wired to `sink` with an in-memory delivery store.
pub fn app_with(config: Config, sink: Arc<RecordingSink>) -> Router {
    let store = Arc::new(InMemoryDeliveryStore::new(config.dedup_retention));
    let endpoint = Endpoint::new(&config, sink, Some(store));
    router(AppState::new(config, endpoint))
}

pub fn app(sink: Arc<RecordingSink>) -> Router {
    app_with(config(&[]), sink)
}
