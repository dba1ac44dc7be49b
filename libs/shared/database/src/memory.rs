//! In-memory repository implementations. They back the cell test suites and
//! are handy for running a single process without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use shared_models::{
    Incident, IncidentSeverity, IncidentStatus, Monitor, MonitoringResult, NewIncident,
};

use crate::error::DatabaseError;
use crate::repositories::{IncidentRepository, MonitorRepository, MonitoringResultStore};

#[derive(Default)]
pub struct InMemoryMonitorRepository {
    monitors: RwLock<HashMap<Uuid, Monitor>>,
}

impl InMemoryMonitorRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, monitor: Monitor) {
        self.monitors.write().await.insert(monitor.id, monitor);
    }

    pub async fn remove(&self, id: Uuid) {
        self.monitors.write().await.remove(&id);
    }
}

#[async_trait]
impl MonitorRepository for InMemoryMonitorRepository {
    async fn find_active(&self) -> Result<Vec<Monitor>, DatabaseError> {
        let monitors = self.monitors.read().await;
        Ok(monitors.values().filter(|m| m.active).cloned().collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Monitor>, DatabaseError> {
        let monitors = self.monitors.read().await;
        Ok(monitors.get(&id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryMonitoringResultStore {
    results: RwLock<Vec<MonitoringResult>>,
    fail_foreign_key: RwLock<u32>,
}

impl InMemoryMonitoringResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn results(&self) -> Vec<MonitoringResult> {
        self.results.read().await.clone()
    }

    /// Makes the next `times` inserts fail with a foreign key violation.
    pub async fn fail_foreign_key_times(&self, times: u32) {
        *self.fail_foreign_key.write().await = times;
    }
}

#[async_trait]
impl MonitoringResultStore for InMemoryMonitoringResultStore {
    async fn insert(&self, result: &MonitoringResult) -> Result<(), DatabaseError> {
        {
            let mut remaining = self.fail_foreign_key.write().await;
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DatabaseError::ForeignKeyViolation(format!(
                    "monitoring_results.monitor_id={} is not present",
                    result.monitor_id
                )));
            }
        }

        self.results.write().await.push(result.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryIncidentRepository {
    incidents: RwLock<HashMap<Uuid, Incident>>,
    fail_creates: RwLock<bool>,
}

impl InMemoryIncidentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn incidents(&self) -> Vec<Incident> {
        self.incidents.read().await.values().cloned().collect()
    }

    pub async fn get(&self, id: Uuid) -> Option<Incident> {
        self.incidents.read().await.get(&id).cloned()
    }

    pub async fn set_fail_creates(&self, fail: bool) {
        *self.fail_creates.write().await = fail;
    }
}

#[async_trait]
impl IncidentRepository for InMemoryIncidentRepository {
    async fn find_open_auto_incident(
        &self,
        monitor_id: Uuid,
    ) -> Result<Option<Incident>, DatabaseError> {
        let incidents = self.incidents.read().await;
        Ok(incidents
            .values()
            .find(|i| {
                i.monitor_id == monitor_id && i.status == IncidentStatus::Open && i.auto_created
            })
            .cloned())
    }

    async fn create(&self, incident: NewIncident) -> Result<Incident, DatabaseError> {
        if *self.fail_creates.read().await {
            return Err(DatabaseError::Api {
                status: 500,
                message: "incident insert rejected".to_string(),
            });
        }

        let created = Incident {
            id: Uuid::new_v4(),
            title: incident.title,
            description: incident.description,
            severity: incident.severity,
            status: incident.status,
            auto_created: incident.auto_created,
            monitor_id: incident.monitor_id,
            service_id: incident.service_id,
            organization_id: incident.organization_id,
            affected_service_ids: incident.affected_service_ids,
            created_at: Utc::now(),
            resolved_at: None,
        };

        self.incidents
            .write()
            .await
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn escalate(&self, id: Uuid, severity: IncidentSeverity) -> Result<(), DatabaseError> {
        let mut incidents = self.incidents.write().await;
        match incidents.get_mut(&id) {
            Some(incident) => {
                incident.severity = severity;
                Ok(())
            }
            None => Err(DatabaseError::Api {
                status: 404,
                message: format!("incident {} not found", id),
            }),
        }
    }

    async fn resolve(
        &self,
        id: Uuid,
        resolved_at: DateTime<Utc>,
    ) -> Result<Incident, DatabaseError> {
        let mut incidents = self.incidents.write().await;
        match incidents.get_mut(&id) {
            Some(incident) => {
                incident.status = IncidentStatus::Resolved;
                incident.resolved_at = Some(resolved_at);
                Ok(incident.clone())
            }
            None => Err(DatabaseError::Api {
                status: 404,
                message: format!("incident {} not found", id),
            }),
        }
    }
}
