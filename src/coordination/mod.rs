//! Coordination primitives shared by the long-running tasks
//!
//! - Shutdown broadcast observed by the ingestion worker and the HTTP server
//! - OS signal handling

pub mod shutdown;

pub use shutdown::{wait_for_os_signal, Shutdown, ShutdownListener, ShutdownSignal};
