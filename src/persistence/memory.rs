//! In-process order store
//!
//! Rows are kept as serialized JSON, the way a document column would hold
//! them, so a damaged row surfaces as a decode error on fetch just like a
//! broken row in the database would.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::traits::{InsertOutcome, OrderStore};
use crate::domain::OrderRecord;
use crate::error::{OrdersError, Result};

#[derive(Debug, Clone)]
struct StoredRow {
    date_created: DateTime<Utc>,
    payload: String,
}

/// DashMap-backed `OrderStore`
#[derive(Clone)]
pub struct MemoryStore {
    rows: Arc<DashMap<String, StoredRow>>,
    available: Arc<AtomicBool>,
    inserts: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rows: Arc::new(DashMap::new()),
            available: Arc::new(AtomicBool::new(true)),
            inserts: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of stored orders
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of successful inserts since creation
    pub fn insert_count(&self) -> u64 {
        self.inserts.load(Ordering::SeqCst)
    }

    /// Simulate losing (or regaining) the connection; every operation fails while unavailable
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Damage a stored row so that fetching it fails
    pub fn corrupt(&self, order_uid: &str) {
        if let Some(mut row) = self.rows.get_mut(order_uid) {
            let cut = row.payload.len() / 2;
            row.payload.truncate(cut);
        }
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(OrdersError::StoreUnavailable(
                "memory store marked unavailable".to_string(),
            ))
        }
    }

    fn ids_newest_first(&self) -> Vec<String> {
        let mut ids: Vec<(DateTime<Utc>, String)> = self
            .rows
            .iter()
            .map(|r| (r.value().date_created, r.key().clone()))
            .collect();
        ids.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        ids.into_iter().map(|(_, id)| id).collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn exists(&self, order_uid: &str) -> Result<bool> {
        self.check_available()?;
        Ok(self.rows.contains_key(order_uid))
    }

    async fn insert_if_absent(&self, order: &OrderRecord) -> Result<InsertOutcome> {
        self.check_available()?;
        let payload = order.to_json()?;

        match self.rows.entry(order.order_uid.clone()) {
            Entry::Occupied(_) => Ok(InsertOutcome::Duplicate),
            Entry::Vacant(slot) => {
                slot.insert(StoredRow {
                    date_created: order.date_created.with_timezone(&Utc),
                    payload,
                });
                self.inserts.fetch_add(1, Ordering::SeqCst);
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    async fn fetch_by_id(&self, order_uid: &str) -> Result<Option<OrderRecord>> {
        self.check_available()?;
        let payload = match self.rows.get(order_uid) {
            Some(row) => row.payload.clone(),
            None => return Ok(None),
        };
        serde_json::from_str(&payload)
            .map(Some)
            .map_err(|e| OrdersError::CorruptRecord {
                order_uid: order_uid.to_string(),
                reason: e.to_string(),
            })
    }

    async fn list_recent_ids(&self, limit: usize) -> Result<Vec<String>> {
        self.check_available()?;
        let mut ids = self.ids_newest_first();
        ids.truncate(limit);
        Ok(ids)
    }

    async fn list_all_ids(&self) -> Result<Vec<String>> {
        self.check_available()?;
        Ok(self.ids_newest_first())
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn order(uid: &str, minutes: i64) -> OrderRecord {
        let mut order =
            OrderRecord::from_json(include_bytes!("../../tests/fixtures/order_valid.json")).unwrap();
        order.order_uid = uid.to_string();
        order.date_created = order.date_created + Duration::minutes(minutes);
        order
    }

    #[tokio::test]
    async fn test_insert_if_absent_is_idempotent() {
        let store = MemoryStore::new();
        let o = order("x", 0);

        assert_eq!(store.insert_if_absent(&o).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(store.insert_if_absent(&o).await.unwrap(), InsertOutcome::Duplicate);
        assert_eq!(store.len(), 1);
        assert_eq!(store.insert_count(), 1);
        assert!(store.exists("x").await.unwrap());
        assert_eq!(store.fetch_by_id("x").await.unwrap(), Some(o));
    }

    #[tokio::test]
    async fn test_recent_ids_newest_first() {
        let store = MemoryStore::new();
        store.insert_if_absent(&order("old", 0)).await.unwrap();
        store.insert_if_absent(&order("new", 10)).await.unwrap();
        store.insert_if_absent(&order("mid", 5)).await.unwrap();

        assert_eq!(store.list_recent_ids(2).await.unwrap(), vec!["new", "mid"]);
        assert_eq!(store.list_all_ids().await.unwrap(), vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn test_corrupt_row_is_an_error() {
        let store = MemoryStore::new();
        store.insert_if_absent(&order("x", 0)).await.unwrap();
        store.corrupt("x");

        let err = store.fetch_by_id("x").await.unwrap_err();
        assert!(matches!(err, OrdersError::CorruptRecord { .. }));
        assert_eq!(store.fetch_by_id("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = MemoryStore::new();
        store.set_available(false);
        assert!(store.ping().await.is_err());
        assert!(store.insert_if_absent(&order("x", 0)).await.is_err());

        store.set_available(true);
        store.ping().await.unwrap();
    }
}
