use async_trait::async_trait;

use crate::domain::OrderRecord;
use crate::error::Result;

/// Result of a conditional insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The order and all of its sub-entities were written
    Inserted,
    /// An order with the same `order_uid` already existed; nothing was written
    Duplicate,
}

/// Transactional persistence of order records
///
/// `insert_if_absent` must decide duplicate-or-insert atomically. Callers may
/// run `exists` first as a cheap pre-filter, but correctness under concurrent
/// double delivery rests on the conditional insert alone.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Whether an order with this id has been stored
    async fn exists(&self, order_uid: &str) -> Result<bool>;

    /// Store the order with its delivery, payment and items in one transaction,
    /// unless the id is already present
    async fn insert_if_absent(&self, order: &OrderRecord) -> Result<InsertOutcome>;

    /// Load a full order. `Ok(None)` means the id is unknown; a row that cannot
    /// be assembled into a record is an error.
    async fn fetch_by_id(&self, order_uid: &str) -> Result<Option<OrderRecord>>;

    /// Up to `limit` ids, newest `date_created` first
    async fn list_recent_ids(&self, limit: usize) -> Result<Vec<String>>;

    /// Every stored id, newest first
    async fn list_all_ids(&self) -> Result<Vec<String>>;

    /// Round-trip to the backing store
    async fn ping(&self) -> Result<()>;
}
