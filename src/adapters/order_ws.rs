//! WebSocket order feed
//!
//! Each text or binary frame carries one serialized order. The connection is
//! re-established lazily on the next `receive_next` after a failure, with a
//! linearly growing delay.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{Instant, Interval};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{FeedError, OrdersError, Result};
use crate::ingest::OrderFeed;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const PING_INTERVAL_SECS: u64 = 30;
const DEFAULT_MAX_RECONNECT_DELAY_SECS: u64 = 30;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Connection {
    stream: WsStream,
    ping: Interval,
}

/// `OrderFeed` over a WebSocket subscription
pub struct WsFeed {
    url: Url,
    receive_timeout: Option<Duration>,
    max_reconnect_delay: Duration,
    attempt: u32,
    conn: Option<Connection>,
}

impl WsFeed {
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| OrdersError::Internal(format!("Invalid feed URL {}: {}", url, e)))?;

        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(OrdersError::Internal(format!(
                    "Unsupported feed URL scheme: {}",
                    other
                )))
            }
        }

        Ok(Self {
            url,
            receive_timeout: None,
            max_reconnect_delay: Duration::from_secs(DEFAULT_MAX_RECONNECT_DELAY_SECS),
            attempt: 0,
            conn: None,
        })
    }

    /// Report `FeedError::Timeout` when no payload arrives within `timeout`
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = Some(timeout);
        self
    }

    pub fn with_max_reconnect_delay(mut self, delay: Duration) -> Self {
        self.max_reconnect_delay = delay;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(1)
            .saturating_mul(self.attempt)
            .min(self.max_reconnect_delay)
    }

    async fn connect(&mut self) -> std::result::Result<(), FeedError> {
        if self.attempt > 0 {
            let delay = self.reconnect_delay();
            info!("Reconnecting to order feed in {:?} (attempt {})", delay, self.attempt);
            tokio::time::sleep(delay).await;
        }

        info!("Connecting to order feed: {}", self.url);

        let connected = tokio::time::timeout(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            connect_async(self.url.as_str()),
        )
        .await;

        let stream = match connected {
            Ok(Ok((stream, _))) => stream,
            Ok(Err(e)) => {
                self.attempt += 1;
                return Err(FeedError::Transport(format!("connect failed: {}", e)));
            }
            Err(_) => {
                self.attempt += 1;
                return Err(FeedError::Transport("connect timed out".to_string()));
            }
        };

        let period = Duration::from_secs(PING_INTERVAL_SECS);
        self.conn = Some(Connection {
            stream,
            ping: tokio::time::interval_at(Instant::now() + period, period),
        });
        self.attempt = 0;
        info!("Connected to order feed");
        Ok(())
    }

    fn disconnect(&mut self, reason: String) -> FeedError {
        self.conn = None;
        self.attempt = self.attempt.max(1);
        FeedError::Transport(reason)
    }
}

#[async_trait]
impl OrderFeed for WsFeed {
    async fn receive_next(&mut self) -> std::result::Result<Vec<u8>, FeedError> {
        let deadline = self.receive_timeout.map(|t| (Instant::now() + t, t));

        loop {
            if self.conn.is_none() {
                self.connect().await?;
            }
            let Some(conn) = self.conn.as_mut() else {
                continue;
            };

            let expired = async {
                match deadline {
                    Some((at, _)) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            let msg = tokio::select! {
                msg = conn.stream.next() => msg,
                _ = conn.ping.tick() => {
                    if let Err(e) = conn.stream.send(Message::Ping(Vec::new())).await {
                        return Err(self.disconnect(format!("ping failed: {}", e)));
                    }
                    debug!("Sent ping");
                    continue;
                }
                _ = expired => {
                    let timeout_ms = deadline.map(|(_, t)| t.as_millis() as u64).unwrap_or_default();
                    return Err(FeedError::Timeout { timeout_ms });
                }
            };

            match msg {
                Some(Ok(Message::Text(text))) => return Ok(text.into_bytes()),
                Some(Ok(Message::Binary(data))) => return Ok(data),
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = conn.stream.send(Message::Pong(data)).await {
                        return Err(self.disconnect(format!("pong failed: {}", e)));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("Order feed sent close frame: {:?}", frame);
                    return Err(self.disconnect("connection closed by peer".to_string()));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Order feed read error: {}", e);
                    return Err(self.disconnect(e.to_string()));
                }
                None => return Err(self.disconnect("stream ended".to_string())),
            }
        }
    }
}
