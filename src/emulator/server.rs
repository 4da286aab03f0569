use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use super::generator::generate_order;
use crate::coordination::ShutdownListener;
use crate::error::{OrdersError, Result};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Producer emulator settings
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    /// Delay between events
    pub interval: Duration,
    /// Stop after this many events per connection
    pub count: Option<u64>,
    /// Re-send the previous order as every Nth event
    pub duplicate_every: Option<u64>,
    /// Send a broken payload as every Mth event
    pub malformed_every: Option<u64>,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            count: None,
            duplicate_every: None,
            malformed_every: None,
        }
    }
}

/// What the emulator emits at a given sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    Fresh,
    Duplicate,
    Malformed,
}

impl EmulatorConfig {
    /// Tick period, never shorter than one millisecond
    fn tick_interval(&self) -> Duration {
        self.interval.max(MIN_INTERVAL)
    }

    fn kind_of(&self, seq: u64, have_previous: bool) -> EventKind {
        let hits = |every: Option<u64>| every.is_some_and(|n| n > 0 && seq % n == 0);

        if hits(self.malformed_every) {
            EventKind::Malformed
        } else if have_previous && hits(self.duplicate_every) {
            EventKind::Duplicate
        } else {
            EventKind::Fresh
        }
    }
}

#[derive(Clone)]
struct EmulatorState {
    config: Arc<EmulatorConfig>,
    shutdown: ShutdownListener,
}

pub fn emulator_router(config: EmulatorConfig, shutdown: ShutdownListener) -> Router {
    Router::new()
        .route("/feed", get(feed_handler))
        .with_state(EmulatorState {
            config: Arc::new(config),
            shutdown,
        })
}

/// Serve `/feed` until shutdown is requested
pub async fn serve(port: u16, config: EmulatorConfig, shutdown: ShutdownListener) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Producer emulator listening on ws://{}/feed", addr);

    let mut stop = shutdown.clone();
    axum::serve(listener, emulator_router(config, shutdown))
        .with_graceful_shutdown(async move {
            stop.triggered().await;
        })
        .await
        .map_err(|e| OrdersError::Internal(format!("Emulator server error: {}", e)))?;

    Ok(())
}

async fn feed_handler(ws: WebSocketUpgrade, State(state): State<EmulatorState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| stream_orders(socket, state))
}

async fn stream_orders(socket: WebSocket, state: EmulatorState) {
    let (mut sender, mut receiver) = socket.split();
    let config = state.config;
    let mut shutdown = state.shutdown;
    let mut rng = StdRng::from_entropy();
    let mut ticker = tokio::time::interval(config.tick_interval());
    let mut previous: Option<String> = None;
    let mut seq: u64 = 0;

    info!("Feed subscriber connected");

    loop {
        if config.count.is_some_and(|limit| seq >= limit) {
            info!("Sent {} events, closing feed", seq);
            let _ = sender.send(Message::Close(None)).await;
            break;
        }

        tokio::select! {
            _ = shutdown.triggered() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            },
            _ = ticker.tick() => {}
        }

        seq += 1;
        let payload = match config.kind_of(seq, previous.is_some()) {
            EventKind::Malformed => {
                debug!(seq, "Sending malformed payload");
                format!("{{\"order_uid\": \"broken-{}\", \"items\": [", seq)
            }
            EventKind::Duplicate => {
                debug!(seq, "Re-sending previous order");
                previous.clone().unwrap_or_default()
            }
            EventKind::Fresh => {
                let order = generate_order(&mut rng);
                match order.to_json() {
                    Ok(json) => {
                        debug!(seq, order_uid = %order.order_uid, "Sending order");
                        previous = Some(json.clone());
                        json
                    }
                    Err(e) => {
                        error!("Failed to serialize generated order: {}", e);
                        continue;
                    }
                }
            }
        };

        if sender.send(Message::Text(payload)).await.is_err() {
            break;
        }
    }

    info!("Feed subscriber disconnected after {} events", seq);
}
