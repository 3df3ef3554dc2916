//! Delivery deduplication.
//!
//! Senders retry deliveries they believe failed. Delivery ids that were
//! already forwarded successfully are remembered for a retention window so
//! a retry is acknowledged without reaching the sink again.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

/// Delivery store failure. Treated as a transient condition.
#[derive(Debug, Error)]
#[error("delivery store unavailable: {0}")]
pub struct StoreError(pub String);

/// Key-value store of delivery ids that were forwarded successfully.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Whether `delivery_id` was forwarded within the retention window.
    async fn seen(&self, delivery_id: &str) -> Result<bool, StoreError>;

    /// Record `delivery_id` as forwarded.
    async fn mark_seen(&self, delivery_id: &str) -> Result<(), StoreError>;
}

/// Process-local delivery store with a fixed retention window.
///
/// Expired ids are evicted lazily on insert. Because every entry has the
/// same retention, insertion order is also expiry order.
pub struct InMemoryDeliveryStore {
    retention: Duration,
    inner: Mutex<Entries>,
}

#[derive(Default)]
struct Entries {
    expires: HashMap<String, Instant>,
    order: VecDeque<(Instant, String)>,
}

impl Entries {
    fn evict_expired(&mut self, now: Instant) {
        while let Some((expiry, _)) = self.order.front() {
            if *expiry > now {
                break;
            }
            if let Some((expiry, id)) = self.order.pop_front() {
                // A later mark_seen may have refreshed this id.
                if self.expires.get(&id) == Some(&expiry) {
                    self.expires.remove(&id);
                }
            }
        }
    }
}

impl InMemoryDeliveryStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            inner: Mutex::new(Entries::default()),
        }
    }

    /// Number of ids currently remembered, expired or not.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .map(|entries| entries.expires.len())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DeliveryStore for InMemoryDeliveryStore {
    async fn seen(&self, delivery_id: &str) -> Result<bool, StoreError> {
        let entries = self
            .inner
            .lock()
            .map_err(|_| StoreError("delivery store lock poisoned".to_string()))?;

        Ok(entries
            .expires
            .get(delivery_id)
            .is_some_and(|expiry| *expiry > Instant::now()))
    }

    async fn mark_seen(&self, delivery_id: &str) -> Result<(), StoreError> {
        let mut entries = self
            .inner
            .lock()
            .map_err(|_| StoreError("delivery store lock poisoned".to_string()))?;

        let now = Instant::now();
        entries.evict_expired(now);

        let expiry = now
            .checked_add(self.retention)
            .ok_or_else(|| StoreError("retention window out of range".to_string()))?;
        entries.expires.insert(delivery_id.to_string(), expiry);
        entries.order.push_back((expiry, delivery_id.to_string()));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_id_is_not_seen() {
        let store = InMemoryDeliveryStore::new(Duration::from_secs(60));
        assert!(!store.seen("abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_marked_id_is_seen() {
        let store = InMemoryDeliveryStore::new(Duration::from_secs(60));
        store.mark_seen("abc").await.unwrap();

        assert!(store.seen("abc").await.unwrap());
        assert!(!store.seen("abd").await.unwrap());
    }

    #[tokio::test]
    async fn test_ids_expire_after_retention() {
        let store = InMemoryDeliveryStore::new(Duration::from_millis(20));
        store.mark_seen("abc").await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!store.seen("abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_ids_are_evicted_on_insert() {
        let store = InMemoryDeliveryStore::new(Duration::from_millis(20));
        store.mark_seen("a").await.unwrap();
        store.mark_seen("b").await.unwrap();
        assert_eq!(store.len(), 2);

        tokio::time::sleep(Duration::from_millis(50)).await;
        store.mark_seen("c").await.unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.seen("c").await.unwrap());
    }

    #[tokio::test]
    async fn test_out_of_range_retention_is_an_error_not_a_panic() {
        let store = InMemoryDeliveryStore::new(Duration::MAX);

        let err = store.mark_seen("a").await.unwrap_err();
        assert!(err.to_string().contains("out of range"));

        // The store stays usable for later deliveries.
        assert!(!store.seen("a").await.unwrap());
        assert!(store.mark_seen("b").await.is_err());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_refreshed_id_survives_eviction_of_stale_entry() {
        let store = InMemoryDeliveryStore::new(Duration::from_millis(200));
        store.mark_seen("a").await.unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        store.mark_seen("a").await.unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        store.mark_seen("b").await.unwrap();

        assert!(store.seen("a").await.unwrap());
    }
}
