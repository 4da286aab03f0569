//! Durable order storage
//!
//! The store is the authority for order records; the cache only mirrors it.
//! - `OrderStore` is the contract consumed by the ingestion pipeline, the
//!   cache warm-up and the read path
//! - `MemoryStore` keeps rows in process for tests and local runs
//! - the PostgreSQL implementation lives in `adapters::postgres`

pub mod memory;
pub mod traits;

pub use memory::MemoryStore;
pub use traits::{InsertOutcome, OrderStore};

#[cfg(test)]
pub use traits::MockOrderStore;
