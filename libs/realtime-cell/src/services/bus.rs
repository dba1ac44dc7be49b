use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use futures::StreamExt;
use redis::AsyncCommands;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use shared_config::AppConfig;

use crate::error::RealtimeError;

const SUBSCRIPTION_BUFFER: usize = 256;
const LOCAL_BUS_CAPACITY: usize = 1024;

/// One message received from a bus channel. The payload is the raw string
/// the publisher sent; event channels carry JSON, control channels carry a
/// bare monitor id.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub channel: String,
    pub payload: String,
}

/// Receiving half of a bus subscription. Each backend pumps its transport
/// into this channel so consumers read one uniform stream.
pub struct BusSubscription {
    rx: mpsc::Receiver<BusMessage>,
}

impl BusSubscription {
    fn new(rx: mpsc::Receiver<BusMessage>) -> Self {
        Self { rx }
    }

    /// Next message, or `None` once the backing transport is gone.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.rx.recv().await
    }
}

/// Named-channel publish/subscribe transport. Delivery is at-least-once per
/// connected subscriber with no ordering guarantee across processes.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, channel: &str, message: &str) -> Result<(), RealtimeError>;

    async fn subscribe(&self, channels: &[&str]) -> Result<BusSubscription, RealtimeError>;
}

/// Redis-backed bus: publishes through a shared pool, subscribes on a
/// dedicated pubsub connection per subscription.
pub struct RedisEventBus {
    pool: Pool,
    client: redis::Client,
}

impl RedisEventBus {
    pub async fn new(config: &AppConfig) -> Result<Self, RealtimeError> {
        let redis_url = config
            .redis_url
            .clone()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        let cfg = Config::from_url(redis_url.clone());
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| RealtimeError::Pool(format!("Pool creation error: {}", e)))?;

        // Test connection
        let mut conn = pool
            .get()
            .await
            .map_err(|e| RealtimeError::Pool(format!("Connection error: {}", e)))?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        let client = redis::Client::open(redis_url)?;
        info!("Redis event bus initialized successfully");

        Ok(Self { pool, client })
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish(&self, channel: &str, message: &str) -> Result<(), RealtimeError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| RealtimeError::Pool(format!("Connection error: {}", e)))?;

        let subscribers: i64 = conn.publish(channel, message).await?;
        debug!(channel, subscribers, "published bus message");
        Ok(())
    }

    async fn subscribe(&self, channels: &[&str]) -> Result<BusSubscription, RealtimeError> {
        let conn = self.client.get_async_connection().await?;
        let mut pubsub = conn.into_pubsub();
        for channel in channels {
            pubsub.subscribe(*channel).await?;
        }

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let channel = msg.get_channel_name().to_string();
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(channel, error = %e, "dropping undecodable bus message");
                        continue;
                    }
                };
                if tx.send(BusMessage { channel, payload }).await.is_err() {
                    break;
                }
            }
            debug!("redis subscription pump ended");
        });

        Ok(BusSubscription::new(rx))
    }
}

/// In-process bus over a broadcast channel. Used by the test suites and by
/// single-replica deployments that have no Redis.
pub struct LocalEventBus {
    sender: broadcast::Sender<BusMessage>,
}

impl LocalEventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(LOCAL_BUS_CAPACITY);
        Self { sender }
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for LocalEventBus {
    async fn publish(&self, channel: &str, message: &str) -> Result<(), RealtimeError> {
        // A send error only means nobody is subscribed, which is fine.
        let _ = self.sender.send(BusMessage {
            channel: channel.to_string(),
            payload: message.to_string(),
        });
        Ok(())
    }

    async fn subscribe(&self, channels: &[&str]) -> Result<BusSubscription, RealtimeError> {
        let mut bus_rx = self.sender.subscribe();
        let wanted: Vec<String> = channels.iter().map(|c| c.to_string()).collect();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);

        tokio::spawn(async move {
            loop {
                match bus_rx.recv().await {
                    Ok(msg) => {
                        if !wanted.iter().any(|c| c == &msg.channel) {
                            continue;
                        }
                        if tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "local bus subscriber lagged, messages dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(BusSubscription::new(rx))
    }
}
