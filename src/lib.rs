pub mod adapters;
pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod emulator;
pub mod error;
pub mod ingest;
pub mod persistence;
pub mod services;
pub mod validation;

pub use adapters::{PostgresStore, WsFeed};
pub use cache::{OrderCache, PopulateReport};
pub use config::AppConfig;
pub use coordination::{Shutdown, ShutdownListener, ShutdownSignal};
pub use domain::{Delivery, Item, OrderRecord, Payment};
pub use error::{FeedError, OrdersError, Result};
pub use ingest::{ChannelFeed, IngestOutcome, IngestionPipeline, OrderFeed, PipelineState, PipelineStats};
pub use persistence::{InsertOutcome, MemoryStore, OrderStore};
pub use services::{HealthState, OrderQuery};
pub use validation::validate_order;
