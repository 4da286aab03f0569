//! Feed ingestion
//!
//! A single worker pulls payloads from an `OrderFeed`, validates them, stores
//! them idempotently and mirrors new orders into the cache.

pub mod feed;
pub mod pipeline;

pub use feed::{ChannelFeed, OrderFeed};
pub use pipeline::{IngestOutcome, IngestionPipeline, PipelineMonitor, PipelineState, PipelineStats};
