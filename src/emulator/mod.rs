//! Producer emulator
//!
//! Streams generated orders over a WebSocket so the service can be exercised
//! end to end without an upstream producer.

pub mod generator;
pub mod server;

pub use generator::{generate_order, sample_order};
pub use server::{emulator_router, serve, EmulatorConfig};
