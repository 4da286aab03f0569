use chrono::Duration;
use orders_service::cache::OrderCache;
use orders_service::domain::OrderRecord;
use orders_service::persistence::{MemoryStore, OrderStore};
use orders_service::services::OrderQuery;
use std::sync::Arc;

fn order(uid: &str, minutes: i64) -> OrderRecord {
    let mut order =
        OrderRecord::from_json(include_bytes!("fixtures/order_valid.json")).unwrap();
    order.order_uid = uid.to_string();
    order.date_created = order.date_created + Duration::minutes(minutes);
    order
}

/// A cache miss that the store can answer is written back into the cache.
#[tokio::test]
async fn miss_backfills_cache() {
    let store = MemoryStore::new();
    let stored = order("order-1", 0);
    store.insert_if_absent(&stored).await.unwrap();

    let cache = Arc::new(OrderCache::new(2).unwrap());
    let query = OrderQuery::new(Arc::new(store.clone()), Arc::clone(&cache));

    assert!(!cache.contains("order-1").await);
    let found = query.get_order("order-1").await.unwrap().unwrap();
    assert_eq!(*found, stored);
    assert!(cache.contains("order-1").await);

    // Served from the cache even once the store goes away
    store.set_available(false);
    assert!(query.get_order("order-1").await.unwrap().is_some());
}

/// Unknown ids are reported as absent and never cached.
#[tokio::test]
async fn not_found_is_not_cached() {
    let store = MemoryStore::new();
    let cache = Arc::new(OrderCache::new(2).unwrap());
    let query = OrderQuery::new(Arc::new(store), Arc::clone(&cache));

    assert!(query.get_order("missing").await.unwrap().is_none());
    assert_eq!(cache.size().await, 0);
}

/// Back-filling respects the capacity bound and evicts the coldest entry.
#[tokio::test]
async fn backfill_evicts_least_recent() {
    let store = MemoryStore::new();
    for (i, uid) in ["a", "b", "c"].iter().enumerate() {
        store.insert_if_absent(&order(uid, i as i64)).await.unwrap();
    }

    let cache = Arc::new(OrderCache::new(2).unwrap());
    let query = OrderQuery::new(Arc::new(store), Arc::clone(&cache));

    for uid in ["a", "b", "c"] {
        query.get_order(uid).await.unwrap();
    }

    assert_eq!(cache.size().await, 2);
    assert_eq!(cache.ids_by_recency().await, vec!["c", "b"]);
}

/// Listing returns every stored id, newest first, cached or not.
#[tokio::test]
async fn list_order_ids_reads_the_store() {
    let store = MemoryStore::new();
    store.insert_if_absent(&order("old", 0)).await.unwrap();
    store.insert_if_absent(&order("new", 5)).await.unwrap();

    let query = OrderQuery::new(Arc::new(store), Arc::new(OrderCache::new(1).unwrap()));
    assert_eq!(query.list_order_ids().await.unwrap(), vec!["new", "old"]);
}
