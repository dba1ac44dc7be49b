use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use realtime_cell::EventBus;
use shared_database::{IncidentRepository, MonitorRepository};
use shared_models::{
    IncidentEvent, IncidentSeverity, IncidentStatus, MonitorStatus, NewIncident,
    INCIDENT_UPDATES_CHANNEL,
};

use crate::error::IncidentError;
use crate::services::failure_tracker::FailureTrackerService;

/// Consecutive-failure counts at which an incident is created or escalated.
/// An action fires only when the count equals a threshold exactly.
pub const INCIDENT_THRESHOLDS: [(IncidentSeverity, u32); 4] = [
    (IncidentSeverity::Low, 3),
    (IncidentSeverity::Medium, 5),
    (IncidentSeverity::High, 7),
    (IncidentSeverity::Critical, 10),
];

/// Drives automatic incident creation, escalation, and resolution from
/// monitor status changes. At most one OPEN auto-created incident exists per
/// monitor; severity only moves upward while it is open.
pub struct IncidentLifecycleService {
    incidents: Arc<dyn IncidentRepository>,
    monitors: Arc<dyn MonitorRepository>,
    failures: Arc<FailureTrackerService>,
    bus: Arc<dyn EventBus>,
}

impl IncidentLifecycleService {
    pub fn new(
        incidents: Arc<dyn IncidentRepository>,
        monitors: Arc<dyn MonitorRepository>,
        failures: Arc<FailureTrackerService>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            incidents,
            monitors,
            failures,
            bus,
        }
    }

    #[instrument(skip(self), fields(%monitor_id, %status))]
    pub async fn handle_status_change(
        &self,
        monitor_id: Uuid,
        status: MonitorStatus,
    ) -> Result<(), IncidentError> {
        match status {
            MonitorStatus::Up => self.resolve_if_open(monitor_id).await,
            MonitorStatus::Down | MonitorStatus::Degraded => {
                let consecutive_failures = self.failures.increment(monitor_id).await;
                let severity = INCIDENT_THRESHOLDS
                    .iter()
                    .find(|(_, threshold)| consecutive_failures == *threshold)
                    .map(|(severity, _)| *severity);

                match severity {
                    Some(severity) => self.create_or_escalate(monitor_id, status, severity).await,
                    None => Ok(()),
                }
            }
        }
    }

    async fn resolve_if_open(&self, monitor_id: Uuid) -> Result<(), IncidentError> {
        let incident = match self.incidents.find_open_auto_incident(monitor_id).await? {
            Some(incident) => incident,
            None => return Ok(()),
        };

        let resolved = self.incidents.resolve(incident.id, Utc::now()).await?;
        info!(incident_id = %resolved.id, %monitor_id, "incident auto-resolved");

        self.publish(&IncidentEvent::resolved(&resolved)).await;
        self.failures.reset(monitor_id).await;
        Ok(())
    }

    async fn create_or_escalate(
        &self,
        monitor_id: Uuid,
        status: MonitorStatus,
        severity: IncidentSeverity,
    ) -> Result<(), IncidentError> {
        let monitor = self
            .monitors
            .find_by_id(monitor_id)
            .await?
            .ok_or(IncidentError::MonitorNotFound(monitor_id))?;

        let organization_id = match (monitor.organization_id, monitor.service_name.as_deref()) {
            (Some(organization_id), Some(name)) if !name.is_empty() => organization_id,
            _ => return Err(IncidentError::MissingLinkage(monitor_id)),
        };

        match self.incidents.find_open_auto_incident(monitor_id).await? {
            Some(existing) => {
                if severity > existing.severity {
                    self.incidents.escalate(existing.id, severity).await?;
                    info!(
                        incident_id = %existing.id,
                        %monitor_id,
                        from = ?existing.severity,
                        to = ?severity,
                        "incident escalated"
                    );
                }
                Ok(())
            }
            None => {
                let new_incident = NewIncident {
                    title: format!("{} {}", monitor.name, status),
                    description: format!(
                        "Monitor {} is reporting status {}.",
                        monitor.name, status
                    ),
                    severity,
                    status: IncidentStatus::Open,
                    auto_created: true,
                    monitor_id,
                    service_id: Some(monitor.service_id),
                    organization_id,
                    affected_service_ids: vec![monitor.service_id],
                };

                let incident = self.incidents.create(new_incident).await?;
                info!(
                    incident_id = %incident.id,
                    %monitor_id,
                    severity = ?severity,
                    "incident created"
                );

                self.publish(&IncidentEvent::created(&incident, &monitor)).await;
                self.failures.clear_failures(monitor_id).await;
                Ok(())
            }
        }
    }

    async fn publish(&self, event: &IncidentEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "failed to serialize incident event");
                return;
            }
        };

        if let Err(e) = self.bus.publish(INCIDENT_UPDATES_CHANNEL, &payload).await {
            warn!(error = %e, "failed to publish incident event");
        }
    }
}
