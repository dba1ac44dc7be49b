use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;
use uuid::Uuid;

use realtime_cell::{run_fanout_listener, ConnectionFanout, EventBus, LocalEventBus, StreamKind};

const RECV_TIMEOUT: Duration = Duration::from_secs(1);

#[tokio::test]
async fn dispatch_reaches_all_connections_for_organization() {
    let fanout = ConnectionFanout::new();
    let organization_id = Uuid::new_v4();

    let (_, mut first) = fanout.register(StreamKind::Monitors, organization_id).await;
    let (_, mut second) = fanout.register(StreamKind::Monitors, organization_id).await;

    fanout
        .dispatch(StreamKind::Monitors, organization_id, "payload")
        .await;

    assert_eq!(first.recv().await.as_deref(), Some("payload"));
    assert_eq!(second.recv().await.as_deref(), Some("payload"));
}

#[tokio::test]
async fn dispatch_never_crosses_organizations() {
    let fanout = ConnectionFanout::new();
    let org_a = Uuid::new_v4();
    let org_b = Uuid::new_v4();

    let (_, mut rx_a) = fanout.register(StreamKind::Monitors, org_a).await;
    let (_, mut rx_b) = fanout.register(StreamKind::Monitors, org_b).await;

    fanout.dispatch(StreamKind::Monitors, org_a, "for-a").await;

    assert_eq!(rx_a.recv().await.as_deref(), Some("for-a"));
    assert!(
        timeout(Duration::from_millis(100), rx_b.recv()).await.is_err(),
        "other organization must not receive the event"
    );
}

#[tokio::test]
async fn dispatch_is_scoped_to_stream_kind() {
    let fanout = ConnectionFanout::new();
    let organization_id = Uuid::new_v4();

    let (_, mut monitors_rx) = fanout.register(StreamKind::Monitors, organization_id).await;
    let (_, mut incidents_rx) = fanout.register(StreamKind::Incidents, organization_id).await;

    fanout
        .dispatch(StreamKind::Incidents, organization_id, "incident")
        .await;

    assert_eq!(incidents_rx.recv().await.as_deref(), Some("incident"));
    assert!(
        timeout(Duration::from_millis(100), monitors_rx.recv())
            .await
            .is_err(),
        "monitor stream must not receive incident events"
    );
}

#[tokio::test]
async fn unregister_is_idempotent() {
    let fanout = ConnectionFanout::new();
    let organization_id = Uuid::new_v4();

    let (connection_id, _rx) = fanout.register(StreamKind::Monitors, organization_id).await;
    assert_eq!(
        fanout
            .connection_count(StreamKind::Monitors, organization_id)
            .await,
        1
    );

    fanout
        .unregister(StreamKind::Monitors, organization_id, connection_id)
        .await;
    fanout
        .unregister(StreamKind::Monitors, organization_id, connection_id)
        .await;

    assert_eq!(
        fanout
            .connection_count(StreamKind::Monitors, organization_id)
            .await,
        0
    );
}

#[tokio::test]
async fn dead_connection_is_pruned_without_disturbing_siblings() {
    let fanout = ConnectionFanout::new();
    let organization_id = Uuid::new_v4();

    let (_, dead_rx) = fanout.register(StreamKind::Monitors, organization_id).await;
    let (_, mut live_rx) = fanout.register(StreamKind::Monitors, organization_id).await;
    drop(dead_rx);

    fanout
        .dispatch(StreamKind::Monitors, organization_id, "still-delivered")
        .await;

    assert_eq!(live_rx.recv().await.as_deref(), Some("still-delivered"));
    assert_eq!(
        fanout
            .connection_count(StreamKind::Monitors, organization_id)
            .await,
        1
    );
}

#[tokio::test]
async fn concurrent_registration_and_dispatch_stay_consistent() {
    let fanout = Arc::new(ConnectionFanout::new());
    let organization_id = Uuid::new_v4();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let fanout = Arc::clone(&fanout);
        handles.push(tokio::spawn(async move {
            let (id, rx) = fanout.register(StreamKind::Monitors, organization_id).await;
            (id, rx)
        }));
    }

    let mut receivers = Vec::new();
    for handle in handles {
        receivers.push(handle.await.expect("registration task should finish"));
    }
    assert_eq!(
        fanout
            .connection_count(StreamKind::Monitors, organization_id)
            .await,
        10
    );

    fanout
        .dispatch(StreamKind::Monitors, organization_id, "broadcast")
        .await;
    for (_, rx) in receivers.iter_mut() {
        assert_eq!(rx.recv().await.as_deref(), Some("broadcast"));
    }
}

#[tokio::test]
async fn listener_routes_bus_events_to_matching_connections() {
    let bus: Arc<LocalEventBus> = Arc::new(LocalEventBus::new());
    let fanout = Arc::new(ConnectionFanout::new());
    let organization_id = Uuid::new_v4();
    let other_org = Uuid::new_v4();

    let (_, mut monitors_rx) = fanout.register(StreamKind::Monitors, organization_id).await;
    let (_, mut incidents_rx) = fanout.register(StreamKind::Incidents, organization_id).await;
    let (_, mut other_rx) = fanout.register(StreamKind::Monitors, other_org).await;

    let listener_bus: Arc<dyn EventBus> = bus.clone();
    let listener = tokio::spawn(run_fanout_listener(listener_bus, Arc::clone(&fanout)));
    // Give the listener a beat to subscribe before publishing.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let monitor_event = json!({
        "organization_id": organization_id,
        "type": "monitor_update",
        "payload": {"id": Uuid::new_v4()}
    });
    bus.publish("monitor_updates_channel", &monitor_event.to_string())
        .await
        .expect("publish should succeed");

    let incident_event = json!({
        "organization_id": organization_id,
        "type": "incident_created",
        "payload": {"id": Uuid::new_v4()}
    });
    bus.publish("incident_updates_channel", &incident_event.to_string())
        .await
        .expect("publish should succeed");

    // An event without an organization scope is skipped, not fatal.
    bus.publish("monitor_updates_channel", "{\"type\":\"monitor_update\"}")
        .await
        .expect("publish should succeed");

    let delivered = timeout(RECV_TIMEOUT, monitors_rx.recv())
        .await
        .expect("monitor event should arrive")
        .expect("connection should be open");
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&delivered).unwrap()["type"],
        "monitor_update"
    );

    let delivered = timeout(RECV_TIMEOUT, incidents_rx.recv())
        .await
        .expect("incident event should arrive")
        .expect("connection should be open");
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&delivered).unwrap()["type"],
        "incident_created"
    );

    assert!(
        timeout(Duration::from_millis(100), other_rx.recv())
            .await
            .is_err(),
        "other organization must stay silent"
    );

    listener.abort();
}
