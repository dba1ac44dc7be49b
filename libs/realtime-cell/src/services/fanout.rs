use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Which realtime surface a connection subscribed to. Monitor updates and
/// incident updates are delivered on separate endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Monitors,
    Incidents,
}

struct Subscriber {
    id: Uuid,
    tx: mpsc::UnboundedSender<String>,
}

/// Per-process registry of live realtime subscribers, keyed by organization.
/// Shared by the WS handlers (register/unregister) and the bus listener
/// (dispatch); all three run concurrently.
pub struct ConnectionFanout {
    connections: Arc<RwLock<HashMap<(StreamKind, Uuid), Vec<Subscriber>>>>,
}

impl ConnectionFanout {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Adds a subscriber and returns its id plus the receiving end of its
    /// outbound queue.
    pub async fn register(
        &self,
        kind: StreamKind,
        organization_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        let mut connections = self.connections.write().await;
        let subscribers = connections.entry((kind, organization_id)).or_default();
        subscribers.push(Subscriber { id, tx });
        info!(
            connection_id = %id,
            %organization_id,
            ?kind,
            total = subscribers.len(),
            "realtime subscriber registered"
        );

        (id, rx)
    }

    /// Removes a subscriber. Safe to call for an id that is already gone.
    pub async fn unregister(&self, kind: StreamKind, organization_id: Uuid, connection_id: Uuid) {
        let mut connections = self.connections.write().await;
        if let Some(subscribers) = connections.get_mut(&(kind, organization_id)) {
            let before = subscribers.len();
            subscribers.retain(|s| s.id != connection_id);
            if subscribers.len() < before {
                info!(
                    %connection_id,
                    %organization_id,
                    ?kind,
                    remaining = subscribers.len(),
                    "realtime subscriber unregistered"
                );
            }
            if subscribers.is_empty() {
                connections.remove(&(kind, organization_id));
            }
        }
    }

    pub async fn connection_count(&self, kind: StreamKind, organization_id: Uuid) -> usize {
        let connections = self.connections.read().await;
        connections
            .get(&(kind, organization_id))
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Pushes a payload to every subscriber registered for the organization.
    /// A failed send removes only that subscriber; the rest still receive
    /// the message.
    pub async fn dispatch(&self, kind: StreamKind, organization_id: Uuid, message: &str) {
        let mut failed = Vec::new();
        {
            let connections = self.connections.read().await;
            let Some(subscribers) = connections.get(&(kind, organization_id)) else {
                debug!(%organization_id, ?kind, "no subscribers for event");
                return;
            };

            debug!(
                %organization_id,
                ?kind,
                count = subscribers.len(),
                "dispatching event to subscribers"
            );
            for subscriber in subscribers {
                if subscriber.tx.send(message.to_string()).is_err() {
                    failed.push(subscriber.id);
                }
            }
        }

        for connection_id in failed {
            warn!(%connection_id, %organization_id, "dropping dead realtime subscriber");
            self.unregister(kind, organization_id, connection_id).await;
        }
    }
}

impl Default for ConnectionFanout {
    fn default() -> Self {
        Self::new()
    }
}
