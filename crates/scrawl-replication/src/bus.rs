//! Pub/sub transports for bus frames.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::StreamExt;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::error::BusError;

/// Capacity of each in-memory channel before slow subscribers lag.
const MEMORY_CHANNEL_CAPACITY: usize = 1024;

/// A publish/subscribe transport.
///
/// Delivery is at-most-once: a message published while nobody listens
/// is gone.
pub trait Bus: Send + Sync + 'static {
    fn publish(
        &self,
        channel: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), BusError>> + Send;

    /// Subscribes to `channel`. The subscription is live when this
    /// returns.
    fn subscribe(&self, channel: &str)
    -> impl Future<Output = Result<Subscription, BusError>> + Send;
}

/// Messages from one channel, in publish order.
pub struct Subscription {
    channel: String,
    receiver: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// The next payload, or `None` once the underlying connection ends.
    pub async fn next(&mut self) -> Option<Vec<u8>> {
        self.receiver.recv().await
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// A bus inside one process. Clones share the same channels, so tests
/// can stand up several "processes" on one runtime.
#[derive(Clone, Default)]
pub struct MemoryBus {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<Vec<u8>> {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(MEMORY_CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Bus for MemoryBus {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), BusError> {
        // No subscribers is not an error on a pub/sub bus.
        let _ = self.sender(channel).send(payload);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BusError> {
        let mut source = self.sender(channel).subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        let name = channel.to_string();
        tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(payload) => {
                        if tx.send(payload).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(channel = %name, skipped, "bus subscriber lagged, messages lost");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(Subscription {
            channel: channel.to_string(),
            receiver: rx,
        })
    }
}

// ---------------------------------------------------------------------------
// Redis
// ---------------------------------------------------------------------------

/// Redis pub/sub.
///
/// Publishing shares one multiplexed connection; each subscription opens
/// its own pub/sub connection, as Redis requires.
#[derive(Clone)]
pub struct RedisBus {
    client: redis::Client,
    conn: MultiplexedConnection,
}

impl RedisBus {
    /// Connects to `url`, e.g. `redis://db:6379`.
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!(url = %url, "connected to bus");
        Ok(Self { client, conn })
    }
}

impl Bus for RedisBus {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let mut conn = self.conn.clone();
        let _: () = conn.publish(channel, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BusError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        debug!(channel = %channel, "subscribed");

        let (tx, rx) = mpsc::unbounded_channel();
        let name = channel.to_string();
        tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(message) = messages.next().await {
                let payload: Vec<u8> = match message.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(channel = %name, error = %e, "unreadable bus payload");
                        continue;
                    }
                };
                if tx.send(payload).is_err() {
                    break;
                }
            }
            debug!(channel = %name, "subscription ended");
        });
        Ok(Subscription {
            channel: channel.to_string(),
            receiver: rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_bus_delivers_in_order_to_every_subscriber() {
        let bus = MemoryBus::new();
        let mut first = bus.subscribe("c").await.unwrap();
        let mut second = bus.subscribe("c").await.unwrap();
        let mut other = bus.subscribe("d").await.unwrap();

        bus.publish("c", b"1".to_vec()).await.unwrap();
        bus.publish("c", b"2".to_vec()).await.unwrap();

        assert_eq!(first.next().await.unwrap(), b"1");
        assert_eq!(first.next().await.unwrap(), b"2");
        assert_eq!(second.next().await.unwrap(), b"1");
        assert_eq!(first.channel(), "c");
        assert!(other.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_memory_bus_publish_without_subscribers_is_ok() {
        let bus = MemoryBus::new();
        assert!(bus.publish("nobody", b"x".to_vec()).await.is_ok());
    }
}
