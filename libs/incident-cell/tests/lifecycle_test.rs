use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use tokio::time::timeout;
use uuid::Uuid;

use incident_cell::{FailureTrackerService, IncidentError, IncidentLifecycleService};
use realtime_cell::{EventBus, LocalEventBus};
use shared_database::memory::{InMemoryIncidentRepository, InMemoryMonitorRepository};
use shared_database::IncidentRepository;
use shared_models::{
    IncidentSeverity, IncidentStatus, Monitor, MonitorStatus, INCIDENT_UPDATES_CHANNEL,
};

const RECV_TIMEOUT: Duration = Duration::from_secs(1);

struct Harness {
    monitors: Arc<InMemoryMonitorRepository>,
    incidents: Arc<InMemoryIncidentRepository>,
    failures: Arc<FailureTrackerService>,
    bus: Arc<LocalEventBus>,
    lifecycle: IncidentLifecycleService,
}

fn harness() -> Harness {
    let monitors = Arc::new(InMemoryMonitorRepository::new());
    let incidents = Arc::new(InMemoryIncidentRepository::new());
    let failures = Arc::new(FailureTrackerService::new());
    let bus = Arc::new(LocalEventBus::new());

    let lifecycle = IncidentLifecycleService::new(
        incidents.clone(),
        monitors.clone(),
        failures.clone(),
        bus.clone(),
    );

    Harness {
        monitors,
        incidents,
        failures,
        bus,
        lifecycle,
    }
}

fn test_monitor(organization_id: Option<Uuid>) -> Monitor {
    Monitor {
        id: Uuid::new_v4(),
        name: "api".to_string(),
        url: "https://example.com/health".to_string(),
        method: "GET".to_string(),
        interval: 60,
        kind: "HTTP".to_string(),
        headers: vec![],
        active: true,
        degraded_threshold: 300,
        timeout: 5000,
        service_id: Uuid::new_v4(),
        service_name: organization_id.map(|_| "Payments".to_string()),
        organization_id,
    }
}

async fn open_auto_incidents(incidents: &InMemoryIncidentRepository) -> usize {
    incidents
        .incidents()
        .await
        .iter()
        .filter(|i| i.status == IncidentStatus::Open && i.auto_created)
        .count()
}

#[tokio::test]
async fn three_consecutive_failures_create_one_low_incident() {
    let h = harness();
    let monitor = test_monitor(Some(Uuid::new_v4()));
    h.monitors.upsert(monitor.clone()).await;

    for _ in 0..2 {
        h.lifecycle
            .handle_status_change(monitor.id, MonitorStatus::Down)
            .await
            .expect("status change should succeed");
        assert_eq!(open_auto_incidents(&h.incidents).await, 0);
    }

    h.lifecycle
        .handle_status_change(monitor.id, MonitorStatus::Down)
        .await
        .expect("status change should succeed");

    let all = h.incidents.incidents().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].severity, IncidentSeverity::Low);
    assert_eq!(all[0].status, IncidentStatus::Open);
    assert!(all[0].auto_created);
    assert_eq!(all[0].title, "api DOWN");
    assert_eq!(
        all[0].description,
        "Monitor api is reporting status DOWN."
    );
}

#[tokio::test]
async fn count_five_escalates_to_medium_without_duplicate() {
    let h = harness();
    let monitor = test_monitor(Some(Uuid::new_v4()));
    h.monitors.upsert(monitor.clone()).await;

    for _ in 0..5 {
        h.lifecycle
            .handle_status_change(monitor.id, MonitorStatus::Down)
            .await
            .expect("status change should succeed");
    }

    let all = h.incidents.incidents().await;
    assert_eq!(all.len(), 1, "escalation must not create a second incident");
    assert_eq!(all[0].severity, IncidentSeverity::Medium);
}

#[tokio::test]
async fn at_most_one_open_auto_incident_across_long_streak() {
    let h = harness();
    let monitor = test_monitor(Some(Uuid::new_v4()));
    h.monitors.upsert(monitor.clone()).await;

    for _ in 0..15 {
        h.lifecycle
            .handle_status_change(monitor.id, MonitorStatus::Down)
            .await
            .expect("status change should succeed");
        assert!(open_auto_incidents(&h.incidents).await <= 1);
    }

    let all = h.incidents.incidents().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].severity, IncidentSeverity::Critical);
}

#[tokio::test]
async fn severity_never_decreases_while_open() {
    let h = harness();
    let monitor = test_monitor(Some(Uuid::new_v4()));
    h.monitors.upsert(monitor.clone()).await;

    // An operator-escalated incident sits at HIGH; a fresh streak reaching
    // the LOW threshold must not pull it back down.
    let existing = h
        .incidents
        .create(shared_models::NewIncident {
            title: "api DOWN".to_string(),
            description: "Monitor api is reporting status DOWN.".to_string(),
            severity: IncidentSeverity::High,
            status: IncidentStatus::Open,
            auto_created: true,
            monitor_id: monitor.id,
            service_id: Some(monitor.service_id),
            organization_id: monitor.organization_id.unwrap(),
            affected_service_ids: vec![monitor.service_id],
        })
        .await
        .expect("seed incident should be created");

    for _ in 0..3 {
        h.lifecycle
            .handle_status_change(monitor.id, MonitorStatus::Down)
            .await
            .expect("status change should succeed");
    }

    let incident = h.incidents.get(existing.id).await.expect("incident exists");
    assert_eq!(incident.severity, IncidentSeverity::High);
}

#[tokio::test]
async fn degraded_counts_toward_thresholds() {
    let h = harness();
    let monitor = test_monitor(Some(Uuid::new_v4()));
    h.monitors.upsert(monitor.clone()).await;

    for _ in 0..3 {
        h.lifecycle
            .handle_status_change(monitor.id, MonitorStatus::Degraded)
            .await
            .expect("status change should succeed");
    }

    let all = h.incidents.incidents().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].title, "api DEGRADED");
    assert_eq!(
        all[0].description,
        "Monitor api is reporting status DEGRADED."
    );
}

#[tokio::test]
async fn up_resolves_open_incident_and_resets_tracker() {
    let h = harness();
    let monitor = test_monitor(Some(Uuid::new_v4()));
    h.monitors.upsert(monitor.clone()).await;

    for _ in 0..3 {
        h.lifecycle
            .handle_status_change(monitor.id, MonitorStatus::Down)
            .await
            .expect("status change should succeed");
    }
    assert_eq!(open_auto_incidents(&h.incidents).await, 1);

    h.lifecycle
        .handle_status_change(monitor.id, MonitorStatus::Up)
        .await
        .expect("status change should succeed");

    let all = h.incidents.incidents().await;
    assert_eq!(all[0].status, IncidentStatus::Resolved);
    assert!(all[0].resolved_at.is_some());
    assert_eq!(h.failures.read(monitor.id).await, 0);
    assert!(h.failures.first_down_at(monitor.id).await.is_none());
    assert!(h.failures.failures(monitor.id).await.is_empty());
}

#[tokio::test]
async fn up_without_open_incident_keeps_the_counter() {
    let h = harness();
    let monitor = test_monitor(Some(Uuid::new_v4()));
    h.monitors.upsert(monitor.clone()).await;

    for _ in 0..2 {
        h.lifecycle
            .handle_status_change(monitor.id, MonitorStatus::Down)
            .await
            .expect("status change should succeed");
    }

    h.lifecycle
        .handle_status_change(monitor.id, MonitorStatus::Up)
        .await
        .expect("status change should succeed");

    // No incident was open, so nothing resolves and the streak survives the
    // isolated UP ping.
    assert_eq!(h.failures.read(monitor.id).await, 2);
}

#[tokio::test]
async fn non_threshold_counts_do_not_touch_incidents() {
    let h = harness();
    let monitor = test_monitor(Some(Uuid::new_v4()));
    h.monitors.upsert(monitor.clone()).await;

    for _ in 0..2 {
        h.lifecycle
            .handle_status_change(monitor.id, MonitorStatus::Down)
            .await
            .expect("status change should succeed");
    }

    assert!(h.incidents.incidents().await.is_empty());
    assert_eq!(h.failures.read(monitor.id).await, 2);
}

#[tokio::test]
async fn creation_clears_failure_log_but_not_counter() {
    let h = harness();
    let monitor = test_monitor(Some(Uuid::new_v4()));
    h.monitors.upsert(monitor.clone()).await;

    for _ in 0..3 {
        h.failures
            .append_failure(
                monitor.id,
                shared_models::FailedPing {
                    checked_at: chrono::Utc::now(),
                    response_time_ms: None,
                    http_status_code: Some(503),
                    error: Some("HTTP error 503".to_string()),
                },
            )
            .await;
        h.lifecycle
            .handle_status_change(monitor.id, MonitorStatus::Down)
            .await
            .expect("status change should succeed");
    }

    assert_eq!(open_auto_incidents(&h.incidents).await, 1);
    assert!(h.failures.failures(monitor.id).await.is_empty());
    assert_eq!(h.failures.read(monitor.id).await, 3);
}

#[tokio::test]
async fn missing_monitor_abandons_the_attempt() {
    let h = harness();
    let unknown = Uuid::new_v4();

    for _ in 0..2 {
        h.lifecycle
            .handle_status_change(unknown, MonitorStatus::Down)
            .await
            .expect("sub-threshold counts never look the monitor up");
    }

    let err = h
        .lifecycle
        .handle_status_change(unknown, MonitorStatus::Down)
        .await
        .expect_err("threshold hit without a monitor should fail");
    assert_matches!(err, IncidentError::MonitorNotFound(id) if id == unknown);
    assert!(h.incidents.incidents().await.is_empty());
}

#[tokio::test]
async fn missing_linkage_abandons_the_attempt() {
    let h = harness();
    let monitor = test_monitor(None);
    h.monitors.upsert(monitor.clone()).await;

    for _ in 0..2 {
        h.lifecycle
            .handle_status_change(monitor.id, MonitorStatus::Down)
            .await
            .expect("status change should succeed");
    }

    let err = h
        .lifecycle
        .handle_status_change(monitor.id, MonitorStatus::Down)
        .await
        .expect_err("unlinked monitor cannot get an incident");
    assert_matches!(err, IncidentError::MissingLinkage(id) if id == monitor.id);
    assert!(h.incidents.incidents().await.is_empty());
}

#[tokio::test]
async fn failed_creation_is_not_retried_on_later_counts() {
    let h = harness();
    let monitor = test_monitor(Some(Uuid::new_v4()));
    h.monitors.upsert(monitor.clone()).await;
    h.incidents.set_fail_creates(true).await;

    for _ in 0..2 {
        h.lifecycle
            .handle_status_change(monitor.id, MonitorStatus::Down)
            .await
            .expect("status change should succeed");
    }
    let err = h
        .lifecycle
        .handle_status_change(monitor.id, MonitorStatus::Down)
        .await
        .expect_err("persistence failure should surface");
    assert_matches!(err, IncidentError::Database(_));

    // The count has moved past the threshold, so the next failure does not
    // re-attempt creation even though persistence works again.
    h.incidents.set_fail_creates(false).await;
    h.lifecycle
        .handle_status_change(monitor.id, MonitorStatus::Down)
        .await
        .expect("status change should succeed");
    assert!(h.incidents.incidents().await.is_empty());
    assert_eq!(h.failures.read(monitor.id).await, 4);
}

#[tokio::test]
async fn lifecycle_events_carry_the_wire_contract() {
    let h = harness();
    let organization_id = Uuid::new_v4();
    let monitor = test_monitor(Some(organization_id));
    h.monitors.upsert(monitor.clone()).await;

    let mut subscription = h
        .bus
        .subscribe(&[INCIDENT_UPDATES_CHANNEL])
        .await
        .expect("subscribe should succeed");

    for _ in 0..3 {
        h.lifecycle
            .handle_status_change(monitor.id, MonitorStatus::Down)
            .await
            .expect("status change should succeed");
    }

    let created = timeout(RECV_TIMEOUT, subscription.recv())
        .await
        .expect("incident_created should be published")
        .expect("subscription should be open");
    let created: serde_json::Value = serde_json::from_str(&created.payload).unwrap();
    assert_eq!(created["type"], "incident_created");
    assert_eq!(created["organization_id"], organization_id.to_string());
    assert_eq!(created["payload"]["severity"], "LOW");
    assert_eq!(created["payload"]["status"], "OPEN");
    assert_eq!(created["payload"]["title"], "api DOWN");
    assert_eq!(created["payload"]["monitorId"], monitor.id.to_string());
    assert_eq!(created["payload"]["url"], monitor.url);
    assert_eq!(created["payload"]["method"], "GET");
    assert_eq!(created["payload"]["serviceName"], "Payments");
    assert_eq!(
        created["payload"]["organizationId"],
        organization_id.to_string()
    );
    assert!(created["payload"]["createdAt"].is_string());

    h.lifecycle
        .handle_status_change(monitor.id, MonitorStatus::Up)
        .await
        .expect("status change should succeed");

    let resolved = timeout(RECV_TIMEOUT, subscription.recv())
        .await
        .expect("incident_resolved should be published")
        .expect("subscription should be open");
    let resolved: serde_json::Value = serde_json::from_str(&resolved.payload).unwrap();
    assert_eq!(resolved["type"], "incident_resolved");
    assert_eq!(resolved["payload"]["status"], "RESOLVED");
    assert_eq!(resolved["payload"]["autoResolved"], true);
    assert!(resolved["payload"]["resolvedAt"].is_string());
    assert!(resolved["payload"].get("title").is_none());
}
