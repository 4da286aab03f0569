use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::feed::OrderFeed;
use crate::cache::OrderCache;
use crate::coordination::ShutdownListener;
use crate::domain::OrderRecord;
use crate::error::{FeedError, OrdersError};
use crate::persistence::{InsertOutcome, OrderStore};
use crate::validation::validate_order;

const PREVIEW_CHARS: usize = 120;

/// What happened to a single feed payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Newly persisted and cached
    Stored { order_uid: String },
    /// Already persisted; nothing changed
    Duplicate { order_uid: String },
    /// Not a decodable order record
    Malformed { reason: String },
    /// Decoded, but failed validation
    Invalid { order_uid: String, reason: String },
    /// The store refused the operation; the event is dropped
    StoreFailed { order_uid: String, reason: String },
}

/// Pipeline lifecycle. There is no transition out of `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Running,
    Stopped,
}

/// Counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub received: u64,
    pub stored: u64,
    pub duplicates: u64,
    pub malformed: u64,
    pub invalid: u64,
    pub store_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    stored: AtomicU64,
    duplicates: AtomicU64,
    malformed: AtomicU64,
    invalid: AtomicU64,
    store_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            received: self.received.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
        }
    }
}

/// Read-only handle on a pipeline that may be running on another task
#[derive(Debug, Clone)]
pub struct PipelineMonitor {
    counters: Arc<Counters>,
    state: watch::Receiver<PipelineState>,
}

impl PipelineMonitor {
    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Resolve once the pipeline has stopped
    pub async fn stopped(&mut self) {
        let _ = self.state.wait_for(|s| *s == PipelineState::Stopped).await;
    }
}

/// Feed → validate → store → cache
///
/// Events are handled strictly one at a time in feed order. Only an order the
/// store reports as newly inserted is added to the cache; a failure at any step
/// drops that event and the loop moves on to the next one.
pub struct IngestionPipeline<F: OrderFeed> {
    feed: F,
    worker: Worker,
    state: watch::Sender<PipelineState>,
}

/// Everything but the feed. Must stay `Sync` so that `run` accepts feeds
/// that are only `Send`.
struct Worker {
    store: Arc<dyn OrderStore>,
    cache: Arc<OrderCache>,
    counters: Arc<Counters>,
}

impl<F: OrderFeed> IngestionPipeline<F> {
    pub fn new(feed: F, store: Arc<dyn OrderStore>, cache: Arc<OrderCache>) -> Self {
        let (state, _) = watch::channel(PipelineState::Running);
        Self {
            feed,
            worker: Worker {
                store,
                cache,
                counters: Arc::new(Counters::default()),
            },
            state,
        }
    }

    pub fn monitor(&self) -> PipelineMonitor {
        PipelineMonitor {
            counters: Arc::clone(&self.worker.counters),
            state: self.state.subscribe(),
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.worker.counters.snapshot()
    }

    /// Handle a single payload end to end
    pub async fn process(&self, payload: &[u8]) -> IngestOutcome {
        self.worker.process(payload).await
    }

    /// Consume the feed until shutdown is requested or the feed closes
    ///
    /// Shutdown is only observed between events, so an event that has been
    /// received is always processed to completion.
    pub async fn run(mut self, mut shutdown: ShutdownListener) -> PipelineStats {
        info!("Ingestion pipeline started");

        loop {
            let next = tokio::select! {
                biased;
                signal = shutdown.triggered() => {
                    info!("Ingestion pipeline stopping ({})", signal);
                    break;
                }
                next = self.feed.receive_next() => next,
            };

            match next {
                Ok(payload) => {
                    let outcome = self.worker.process(&payload).await;
                    debug!(?outcome, "Event handled");
                }
                Err(FeedError::Closed) => {
                    info!("Order feed closed");
                    break;
                }
                Err(e @ FeedError::Timeout { .. }) => {
                    debug!("{}", e);
                }
                Err(e @ FeedError::Transport(_)) => {
                    warn!("Order feed error: {}", e);
                }
            }
        }

        self.state.send_replace(PipelineState::Stopped);
        let stats = self.worker.counters.snapshot();
        info!(
            received = stats.received,
            stored = stats.stored,
            duplicates = stats.duplicates,
            malformed = stats.malformed,
            invalid = stats.invalid,
            store_failures = stats.store_failures,
            "Ingestion pipeline stopped"
        );
        stats
    }
}

impl Worker {
    async fn process(&self, payload: &[u8]) -> IngestOutcome {
        Counters::bump(&self.counters.received);

        let order = match OrderRecord::from_json(payload) {
            Ok(order) => order,
            Err(e) => {
                warn!(
                    digest = %fingerprint(payload),
                    preview = %preview(payload),
                    "Dropping malformed event: {}",
                    e
                );
                Counters::bump(&self.counters.malformed);
                return IngestOutcome::Malformed {
                    reason: e.to_string(),
                };
            }
        };

        if let Err(e) = validate_order(&order) {
            warn!(
                order_uid = %order.order_uid,
                digest = %fingerprint(payload),
                "Dropping invalid order: {}",
                e
            );
            Counters::bump(&self.counters.invalid);
            return IngestOutcome::Invalid {
                order_uid: order.order_uid,
                reason: e.to_string(),
            };
        }

        match self.store.exists(&order.order_uid).await {
            Ok(true) => return self.duplicate(order.order_uid),
            Ok(false) => {}
            Err(e) => return self.store_failed(order.order_uid, e),
        }

        match self.store.insert_if_absent(&order).await {
            Ok(InsertOutcome::Inserted) => {
                let order_uid = order.order_uid.clone();
                self.cache.set(Arc::new(order)).await;
                Counters::bump(&self.counters.stored);
                info!(order_uid = %order_uid, "Order stored");
                IngestOutcome::Stored { order_uid }
            }
            // Lost a race with a concurrent delivery of the same order
            Ok(InsertOutcome::Duplicate) => self.duplicate(order.order_uid),
            Err(e) => self.store_failed(order.order_uid, e),
        }
    }

    fn duplicate(&self, order_uid: String) -> IngestOutcome {
        info!(order_uid = %order_uid, "Order already stored, skipping redelivery");
        Counters::bump(&self.counters.duplicates);
        IngestOutcome::Duplicate { order_uid }
    }

    fn store_failed(&self, order_uid: String, e: OrdersError) -> IngestOutcome {
        error!(order_uid = %order_uid, "Store rejected order, event dropped: {}", e);
        Counters::bump(&self.counters.store_failures);
        IngestOutcome::StoreFailed {
            order_uid,
            reason: e.to_string(),
        }
    }
}

/// Short sha256 digest used to correlate dropped payloads in logs
fn fingerprint(payload: &[u8]) -> String {
    let digest = Sha256::digest(payload);
    hex::encode(&digest[..8])
}

fn preview(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload)
        .chars()
        .take(PREVIEW_CHARS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::{Shutdown, ShutdownSignal};
    use crate::error::OrdersError;
    use crate::ingest::ChannelFeed;
    use crate::persistence::MockOrderStore;
    use std::time::Duration;

    const FIXTURE: &[u8] = include_bytes!("../../tests/fixtures/order_valid.json");
    const FIXTURE_UID: &str = "b563feb7-b2b8-4b6c-9f5d-1a7e3c2d4f60";

    fn pipeline(store: MockOrderStore) -> (IngestionPipeline<ChannelFeed>, Arc<OrderCache>) {
        let (_tx, feed) = ChannelFeed::new(8);
        let cache = Arc::new(OrderCache::new(4).unwrap());
        let pipeline = IngestionPipeline::new(feed, Arc::new(store), Arc::clone(&cache));
        (pipeline, cache)
    }

    fn fixture_with_uid(uid: &str) -> Vec<u8> {
        let mut order = OrderRecord::from_json(FIXTURE).unwrap();
        order.order_uid = uid.to_string();
        order.to_json().unwrap().into_bytes()
    }

    #[tokio::test]
    async fn test_existing_order_skips_insert() {
        let mut store = MockOrderStore::new();
        store.expect_exists().times(1).returning(|_| Ok(true));
        store.expect_insert_if_absent().never();

        let (pipeline, cache) = pipeline(store);
        let outcome = pipeline.process(FIXTURE).await;

        assert_eq!(
            outcome,
            IngestOutcome::Duplicate {
                order_uid: FIXTURE_UID.to_string()
            }
        );
        assert_eq!(cache.size().await, 0);
        assert_eq!(pipeline.stats().duplicates, 1);
    }

    #[tokio::test]
    async fn test_lost_insert_race_is_a_duplicate() {
        let mut store = MockOrderStore::new();
        store.expect_exists().returning(|_| Ok(false));
        store
            .expect_insert_if_absent()
            .times(1)
            .returning(|_| Ok(InsertOutcome::Duplicate));

        let (pipeline, cache) = pipeline(store);
        assert!(matches!(
            pipeline.process(FIXTURE).await,
            IngestOutcome::Duplicate { .. }
        ));
        assert!(!cache.contains(FIXTURE_UID).await);
    }

    #[tokio::test]
    async fn test_store_failure_leaves_cache_untouched() {
        let mut store = MockOrderStore::new();
        store
            .expect_exists()
            .returning(|_| Err(OrdersError::StoreUnavailable("connection refused".into())));
        store.expect_insert_if_absent().never();

        let (pipeline, cache) = pipeline(store);
        let outcome = pipeline.process(FIXTURE).await;

        assert!(matches!(outcome, IngestOutcome::StoreFailed { .. }));
        assert_eq!(cache.size().await, 0);
        assert_eq!(pipeline.stats().store_failures, 1);
    }

    #[tokio::test]
    async fn test_malformed_and_invalid_never_reach_store() {
        let mut store = MockOrderStore::new();
        store.expect_exists().never();
        store.expect_insert_if_absent().never();

        let (pipeline, _cache) = pipeline(store);

        assert!(matches!(
            pipeline.process(b"{\"order_uid\":").await,
            IngestOutcome::Malformed { .. }
        ));

        let mut order = OrderRecord::from_json(FIXTURE).unwrap();
        order.items.clear();
        let payload = order.to_json().unwrap();
        assert!(matches!(
            pipeline.process(payload.as_bytes()).await,
            IngestOutcome::Invalid { .. }
        ));

        let stats = pipeline.stats();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.invalid, 1);
    }

    #[tokio::test]
    async fn test_run_continues_after_insert_failure() {
        let first = "11111111-1111-4111-8111-111111111111";
        let second = "22222222-2222-4222-8222-222222222222";

        let mut store = MockOrderStore::new();
        store.expect_exists().returning(|_| Ok(false));
        store
            .expect_insert_if_absent()
            .withf(move |o: &OrderRecord| o.order_uid == first)
            .times(1)
            .returning(|_| Err(OrdersError::StoreUnavailable("deadlock detected".into())));
        store
            .expect_insert_if_absent()
            .withf(move |o: &OrderRecord| o.order_uid == second)
            .times(1)
            .returning(|_| Ok(InsertOutcome::Inserted));

        let (tx, feed) = ChannelFeed::new(8);
        let cache = Arc::new(OrderCache::new(4).unwrap());
        let pipeline = IngestionPipeline::new(feed, Arc::new(store), Arc::clone(&cache));
        let monitor = pipeline.monitor();

        tx.send(fixture_with_uid(first)).await.unwrap();
        tx.send(fixture_with_uid(second)).await.unwrap();
        drop(tx);

        let stats = pipeline.run(Shutdown::new().listener()).await;

        assert_eq!(stats.received, 2);
        assert_eq!(stats.store_failures, 1);
        assert_eq!(stats.stored, 1);
        assert!(!cache.contains(first).await);
        assert!(cache.contains(second).await);
        assert_eq!(monitor.state(), PipelineState::Stopped);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_while_idle() {
        let store = MockOrderStore::new();
        let (_tx, feed) = ChannelFeed::new(1);
        let cache = Arc::new(OrderCache::new(1).unwrap());
        let pipeline = IngestionPipeline::new(feed, Arc::new(store), cache);
        let mut monitor = pipeline.monitor();

        let shutdown = Shutdown::new();
        let handle = tokio::spawn(pipeline.run(shutdown.listener()));
        assert_eq!(monitor.state(), PipelineState::Running);

        shutdown.request(ShutdownSignal::Requested);
        let stats = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("pipeline did not stop")
            .unwrap();

        monitor.stopped().await;
        assert_eq!(stats, PipelineStats::default());
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint(b"abc"), fingerprint(b"abc"));
        assert_eq!(fingerprint(b"abc").len(), 16);
        assert_ne!(fingerprint(b"abc"), fingerprint(b"abd"));
        assert_eq!(preview("é".repeat(200).as_bytes()).chars().count(), PREVIEW_CHARS);
    }
}
