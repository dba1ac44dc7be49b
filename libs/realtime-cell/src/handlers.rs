use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info};
use uuid::Uuid;

use crate::services::fanout::{ConnectionFanout, StreamKind};

/// Ping frame cadence while a connection has nothing else to send.
const KEEPALIVE_PERIOD: Duration = Duration::from_secs(60);

/// `GET /ws/monitors/{organization_id}` — live monitor updates for one
/// organization.
pub async fn monitor_updates_ws(
    ws: WebSocketUpgrade,
    Path(organization_id): Path<Uuid>,
    State(fanout): State<Arc<ConnectionFanout>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        handle_subscriber(socket, fanout, StreamKind::Monitors, organization_id)
    })
}

/// `GET /ws/incidents/{organization_id}` — live incident lifecycle events
/// for one organization.
pub async fn incident_updates_ws(
    ws: WebSocketUpgrade,
    Path(organization_id): Path<Uuid>,
    State(fanout): State<Arc<ConnectionFanout>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        handle_subscriber(socket, fanout, StreamKind::Incidents, organization_id)
    })
}

async fn handle_subscriber(
    socket: WebSocket,
    fanout: Arc<ConnectionFanout>,
    kind: StreamKind,
    organization_id: Uuid,
) {
    let (connection_id, mut outbound) = fanout.register(kind, organization_id).await;
    let (mut sink, mut stream) = socket.split();
    let mut keepalive = tokio::time::interval(KEEPALIVE_PERIOD);
    keepalive.tick().await;

    loop {
        tokio::select! {
            payload = outbound.recv() => {
                match payload {
                    Some(payload) => {
                        if sink.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Client chatter (pongs, pings, text) just keeps the
                        // connection alive.
                    }
                    Some(Err(e)) => {
                        debug!(%connection_id, error = %e, "websocket receive error");
                        break;
                    }
                }
            }
            _ = keepalive.tick() => {
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    fanout.unregister(kind, organization_id, connection_id).await;
    info!(%connection_id, %organization_id, ?kind, "websocket closed");
}
