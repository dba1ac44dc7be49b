//! Narrow seams to the externally-owned persistence layer. The monitoring
//! core never touches tables directly; it consumes these traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use shared_models::{Incident, IncidentSeverity, Monitor, MonitoringResult, NewIncident};

use crate::error::DatabaseError;

/// Read-only access to monitor snapshots, joined with the owning service
/// name and organization id.
#[async_trait]
pub trait MonitorRepository: Send + Sync {
    async fn find_active(&self) -> Result<Vec<Monitor>, DatabaseError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Monitor>, DatabaseError>;
}

/// Append-only store for probe outcomes. A write against a deleted monitor
/// surfaces as [`DatabaseError::ForeignKeyViolation`] so the caller can
/// apply its bounded retry.
#[async_trait]
pub trait MonitoringResultStore: Send + Sync {
    async fn insert(&self, result: &MonitoringResult) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait IncidentRepository: Send + Sync {
    /// The single OPEN auto-created incident for a monitor, if any.
    async fn find_open_auto_incident(
        &self,
        monitor_id: Uuid,
    ) -> Result<Option<Incident>, DatabaseError>;

    async fn create(&self, incident: NewIncident) -> Result<Incident, DatabaseError>;

    async fn escalate(&self, id: Uuid, severity: IncidentSeverity) -> Result<(), DatabaseError>;

    async fn resolve(
        &self,
        id: Uuid,
        resolved_at: DateTime<Utc>,
    ) -> Result<Incident, DatabaseError>;
}
