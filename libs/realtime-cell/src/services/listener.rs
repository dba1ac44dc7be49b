use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use shared_models::{INCIDENT_UPDATES_CHANNEL, MONITOR_UPDATES_CHANNEL};

use crate::error::RealtimeError;
use crate::services::bus::EventBus;
use crate::services::fanout::{ConnectionFanout, StreamKind};

/// Subscribes once to the event channels and feeds every message into the
/// fanout. Runs until the bus subscription ends; spawn it at process start.
pub async fn run_fanout_listener(
    bus: Arc<dyn EventBus>,
    fanout: Arc<ConnectionFanout>,
) -> Result<(), RealtimeError> {
    let mut subscription = bus
        .subscribe(&[MONITOR_UPDATES_CHANNEL, INCIDENT_UPDATES_CHANNEL])
        .await?;
    info!(
        channels = ?[MONITOR_UPDATES_CHANNEL, INCIDENT_UPDATES_CHANNEL],
        "fanout listener subscribed"
    );

    while let Some(message) = subscription.recv().await {
        let kind = match message.channel.as_str() {
            MONITOR_UPDATES_CHANNEL => StreamKind::Monitors,
            INCIDENT_UPDATES_CHANNEL => StreamKind::Incidents,
            _ => continue,
        };

        let value: Value = match serde_json::from_str(&message.payload) {
            Ok(value) => value,
            Err(e) => {
                error!(channel = %message.channel, error = %e, "failed to parse bus event");
                continue;
            }
        };

        let organization_id = value
            .get("organization_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());
        match organization_id {
            Some(organization_id) => {
                fanout.dispatch(kind, organization_id, &message.payload).await;
            }
            None => {
                warn!(channel = %message.channel, "event missing organization_id, skipping");
            }
        }
    }

    info!("fanout listener shut down");
    Ok(())
}
