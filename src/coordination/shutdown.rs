//! Shutdown broadcast
//!
//! One `Shutdown` handle is created at startup. Workers hold a
//! `ShutdownListener` and race it against their blocking waits, so a request
//! is observed at the next suspension point.

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Why shutdown was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// Requested from inside the process
    Requested,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "interrupt"),
            ShutdownSignal::Terminate => write!(f, "terminate"),
            ShutdownSignal::Requested => write!(f, "requested"),
        }
    }
}

/// Shutdown coordinator
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<Option<ShutdownSignal>>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Subscribe to the shutdown broadcast
    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    pub fn is_requested(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Request shutdown. Only the first request is recorded.
    pub fn request(&self, signal: ShutdownSignal) {
        let first = self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(signal);
            true
        });

        if first {
            info!("Shutdown requested: {}", signal);
        } else {
            warn!("Shutdown already requested, ignoring duplicate signal: {}", signal);
        }
    }

    /// Wait for SIGINT/SIGTERM and turn it into a shutdown request
    pub async fn trigger_on_os_signal(&self) {
        let signal = wait_for_os_signal().await;
        self.request(signal);
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of the shutdown broadcast
#[derive(Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<Option<ShutdownSignal>>,
}

impl ShutdownListener {
    pub fn is_triggered(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Resolve once shutdown has been requested. If every coordinator is
    /// dropped without a request this never resolves.
    pub async fn triggered(&mut self) -> ShutdownSignal {
        // Copy out so the watch guard is released before any further await
        let seen = self.rx.wait_for(|s| s.is_some()).await.map(|s| *s);
        match seen {
            Ok(signal) => signal.unwrap_or(ShutdownSignal::Requested),
            Err(_) => std::future::pending().await,
        }
    }

    /// Wait for shutdown for at most `timeout`; returns whether it was requested
    pub async fn triggered_within(&mut self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.triggered()).await.is_ok()
    }
}

/// Resolve on the first SIGINT or SIGTERM
pub async fn wait_for_os_signal() -> ShutdownSignal {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => ShutdownSignal::Interrupt,
        _ = terminate => ShutdownSignal::Terminate,
    }
}
