//! Bounded in-memory order cache
//!
//! Mirrors hot order records in front of the durable store. Every operation
//! goes through one `RwLock` that guards the key map and the recency list
//! together, so no caller ever observes a half-applied update. Reads take the
//! lock in write mode because a hit promotes the entry.

mod lru;

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::OrderRecord;
use crate::error::{OrdersError, Result};
use crate::persistence::OrderStore;
use lru::LruIndex;

/// Extra candidate ids requested during warm-up to cover rows that fail to load
const POPULATE_SLACK: usize = 32;

/// Outcome of a bulk warm-up from the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulateReport {
    /// Records installed into the cache
    pub loaded: usize,
    /// Candidate ids whose record could not be loaded
    pub skipped: usize,
}

/// LRU cache of order records keyed by `order_uid`
pub struct OrderCache {
    inner: RwLock<LruIndex<Arc<OrderRecord>>>,
    capacity: usize,
}

impl OrderCache {
    /// Create a cache holding at most `capacity` orders
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(OrdersError::InvalidCapacity(capacity));
        }
        Ok(Self {
            inner: RwLock::new(LruIndex::new(capacity)),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up an order, promoting it to most recently used on a hit
    pub async fn get(&self, order_uid: &str) -> Option<Arc<OrderRecord>> {
        self.inner.write().await.get(order_uid)
    }

    /// Insert or replace an order. Evicts at most one entry, the least recently used.
    pub async fn set(&self, order: Arc<OrderRecord>) {
        let key = order.order_uid.clone();
        let evicted = self.inner.write().await.put(key, order);
        if let Some(evicted) = evicted {
            debug!("Evicted order {} from cache", evicted);
        }
    }

    /// Remove an order if present
    pub async fn delete(&self, order_uid: &str) {
        if self.inner.write().await.remove(order_uid).is_some() {
            debug!("Removed order {} from cache", order_uid);
        }
    }

    pub async fn contains(&self, order_uid: &str) -> bool {
        self.inner.read().await.contains(order_uid)
    }

    pub async fn size(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Ids of every cached order, in no particular order
    pub async fn all_ids(&self) -> HashSet<String> {
        self.inner.read().await.keys().cloned().collect()
    }

    /// Ids ordered from most to least recently used
    pub async fn ids_by_recency(&self) -> Vec<String> {
        self.inner.read().await.keys_by_recency()
    }

    /// Warm the cache from the durable store
    ///
    /// Candidates are the store's newest ids, over-fetched by a fixed slack so
    /// a few broken rows do not leave the cache short. A record that fails to
    /// load is logged and skipped, and the next candidate is tried until
    /// `min(limit, capacity)` records are loaded or candidates run out. The
    /// batch is installed oldest first under a single lock acquisition, so the
    /// newest order ends up most recently used.
    pub async fn populate(&self, store: &dyn OrderStore, limit: usize) -> Result<PopulateReport> {
        let target = limit.min(self.capacity);
        let mut report = PopulateReport::default();
        if target == 0 {
            return Ok(report);
        }

        let ids = store
            .list_recent_ids(target.saturating_add(POPULATE_SLACK))
            .await?;
        let mut batch = Vec::with_capacity(target);

        for order_uid in ids {
            if batch.len() == target {
                break;
            }
            match store.fetch_by_id(&order_uid).await {
                Ok(Some(order)) => batch.push(Arc::new(order)),
                Ok(None) => {
                    warn!("Order {} vanished before it could be cached", order_uid);
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!("Failed to load order {} into cache: {}", order_uid, e);
                    report.skipped += 1;
                }
            }
        }

        {
            let mut inner = self.inner.write().await;
            for order in batch.into_iter().rev() {
                let key = order.order_uid.clone();
                inner.put(key, order);
                report.loaded += 1;
            }
        }

        info!(
            "Cache populated with {} orders ({} skipped, capacity {})",
            report.loaded, report.skipped, self.capacity
        );
        Ok(report)
    }
}

impl std::fmt::Debug for OrderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderCache")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use chrono::{Duration, TimeZone, Utc};

    fn order(uid: &str) -> Arc<OrderRecord> {
        let mut order = OrderRecord::from_json(include_bytes!("../../tests/fixtures/order_valid.json"))
            .unwrap();
        order.order_uid = uid.to_string();
        Arc::new(order)
    }

    #[tokio::test]
    async fn test_zero_capacity_rejected() {
        let err = OrderCache::new(0).unwrap_err();
        assert!(matches!(err, OrdersError::InvalidCapacity(0)));
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = OrderCache::new(2).unwrap();
        let a = order("a");
        cache.set(a.clone()).await;

        assert_eq!(cache.get("a").await.as_deref(), Some(a.as_ref()));
        assert!(cache.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_third_insert_evicts_first() {
        let cache = OrderCache::new(2).unwrap();
        cache.set(order("A")).await;
        cache.set(order("B")).await;
        cache.set(order("C")).await;

        assert!(cache.get("A").await.is_none());
        assert!(cache.get("B").await.is_some());
        assert!(cache.get("C").await.is_some());
        assert_eq!(cache.size().await, 2);
    }

    #[tokio::test]
    async fn test_get_protects_from_eviction() {
        let cache = OrderCache::new(2).unwrap();
        cache.set(order("A")).await;
        cache.set(order("B")).await;
        cache.get("A").await;
        cache.set(order("C")).await;

        assert!(cache.contains("A").await);
        assert!(!cache.contains("B").await);
    }

    #[tokio::test]
    async fn test_reset_existing_moves_to_front() {
        let cache = OrderCache::new(3).unwrap();
        cache.set(order("A")).await;
        cache.set(order("B")).await;
        cache.set(order("A")).await;

        assert_eq!(cache.size().await, 2);
        assert_eq!(cache.ids_by_recency().await, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_delete() {
        let cache = OrderCache::new(2).unwrap();
        cache.set(order("A")).await;
        cache.delete("A").await;
        cache.delete("A").await;

        assert_eq!(cache.size().await, 0);
        assert!(cache.all_ids().await.is_empty());
    }

    async fn seeded_store(count: usize) -> MemoryStore {
        let store = MemoryStore::new();
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        for i in 0..count {
            let mut o = (*order(&format!("order-{}", i))).clone();
            o.date_created = (base + Duration::minutes(i as i64)).fixed_offset();
            store.insert_if_absent(&o).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_populate_loads_newest_up_to_capacity() {
        let store = seeded_store(5).await;
        let cache = OrderCache::new(2).unwrap();

        let report = cache.populate(&store, 10).await.unwrap();
        assert_eq!(report, PopulateReport { loaded: 2, skipped: 0 });
        assert_eq!(cache.ids_by_recency().await, vec!["order-4", "order-3"]);
    }

    #[tokio::test]
    async fn test_populate_skips_corrupt_rows() {
        let store = seeded_store(5).await;
        // Newest-first, the third candidate is order-2
        store.corrupt("order-2");
        let cache = OrderCache::new(2).unwrap();

        let report = cache.populate(&store, 5).await.unwrap();
        assert_eq!(report.loaded, 2);
        assert_eq!(cache.size().await, 2);

        store.corrupt("order-4");
        let cache = OrderCache::new(2).unwrap();
        let report = cache.populate(&store, 5).await.unwrap();
        assert_eq!(report, PopulateReport { loaded: 2, skipped: 2 });
        assert_eq!(cache.ids_by_recency().await, vec!["order-3", "order-1"]);
    }

    #[tokio::test]
    async fn test_populate_replaces_broken_newest_row() {
        let store = seeded_store(5).await;
        store.corrupt("order-4");
        let cache = OrderCache::new(2).unwrap();

        // Limit equal to capacity still fills the cache past the broken row
        let report = cache.populate(&store, 2).await.unwrap();
        assert_eq!(report, PopulateReport { loaded: 2, skipped: 1 });
        assert_eq!(cache.ids_by_recency().await, vec!["order-3", "order-2"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_access_respects_capacity() {
        const CAPACITY: usize = 8;
        let cache = Arc::new(OrderCache::new(CAPACITY).unwrap());

        let mut tasks = Vec::new();
        for t in 0..16 {
            let cache = Arc::clone(&cache);
            tasks.push(tokio::spawn(async move {
                for i in 0..200 {
                    let uid = format!("order-{}", (t * 7 + i) % 24);
                    match i % 3 {
                        0 => cache.set(order(&uid)).await,
                        1 => {
                            if let Some(hit) = cache.get(&uid).await {
                                assert_eq!(hit.order_uid, uid);
                            }
                        }
                        _ => cache.delete(&uid).await,
                    }
                    assert!(cache.size().await <= CAPACITY);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let by_recency = cache.ids_by_recency().await;
        let all = cache.all_ids().await;
        assert!(all.len() <= CAPACITY);
        assert_eq!(by_recency.len(), all.len());
        assert_eq!(by_recency.into_iter().collect::<HashSet<_>>(), all);
    }

    #[tokio::test]
    async fn test_populate_store_failure() {
        let store = seeded_store(3).await;
        store.set_available(false);
        let cache = OrderCache::new(2).unwrap();

        assert!(cache.populate(&store, 2).await.is_err());
        assert_eq!(cache.size().await, 0);
    }
}
