use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::FeedError;

/// Consumption side of the order feed
///
/// `receive_next` blocks until a payload is available. Transport and timeout
/// errors are recoverable; `FeedError::Closed` means no further payloads will
/// ever arrive. Delivery is at-least-once, so the same payload may be
/// returned more than once. Implementations pace their own reconnects; the
/// caller asks again immediately after a recoverable error.
#[async_trait]
pub trait OrderFeed: Send {
    async fn receive_next(&mut self) -> Result<Vec<u8>, FeedError>;
}

/// In-process feed backed by a tokio channel
///
/// Closes once every sender has been dropped and the buffer is drained.
pub struct ChannelFeed {
    rx: mpsc::Receiver<Vec<u8>>,
    receive_timeout: Option<Duration>,
}

impl ChannelFeed {
    /// Create a feed and the sender used to publish into it
    pub fn new(buffer: usize) -> (mpsc::Sender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            tx,
            Self {
                rx,
                receive_timeout: None,
            },
        )
    }

    /// Give up waiting after `timeout` and report `FeedError::Timeout`
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl OrderFeed for ChannelFeed {
    async fn receive_next(&mut self) -> Result<Vec<u8>, FeedError> {
        let next = match self.receive_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.rx.recv())
                .await
                .map_err(|_| FeedError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                })?,
            None => self.rx.recv().await,
        };
        next.ok_or(FeedError::Closed)
    }
}
