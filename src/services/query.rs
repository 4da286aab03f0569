//! Read path: cache first, store on miss

use std::sync::Arc;
use tracing::{debug, instrument};

use crate::cache::OrderCache;
use crate::domain::OrderRecord;
use crate::error::{OrdersError, Result};
use crate::persistence::OrderStore;

/// Order lookups for the HTTP layer
#[derive(Clone)]
pub struct OrderQuery {
    store: Arc<dyn OrderStore>,
    cache: Arc<OrderCache>,
}

impl OrderQuery {
    pub fn new(store: Arc<dyn OrderStore>, cache: Arc<OrderCache>) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &Arc<OrderCache> {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    /// Look up an order by id
    ///
    /// A cache miss falls through to the store and a hit there is written back
    /// into the cache. Unknown ids return `Ok(None)` and leave the cache as is.
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_uid: &str) -> Result<Option<Arc<OrderRecord>>> {
        if order_uid.trim().is_empty() {
            return Err(OrdersError::Validation(
                "order_uid must not be empty".to_string(),
            ));
        }

        if let Some(order) = self.cache.get(order_uid).await {
            debug!("Cache hit");
            return Ok(Some(order));
        }

        match self.store.fetch_by_id(order_uid).await? {
            Some(order) => {
                debug!("Cache miss, loaded from store");
                let order = Arc::new(order);
                self.cache.set(Arc::clone(&order)).await;
                Ok(Some(order))
            }
            None => {
                debug!("Order not found");
                Ok(None)
            }
        }
    }

    /// Every persisted order id, newest first
    pub async fn list_order_ids(&self) -> Result<Vec<String>> {
        self.store.list_all_ids().await
    }
}
