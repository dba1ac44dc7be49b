use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Incident severity, ordered so escalation comparisons read as `new > current`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IncidentSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IncidentStatus {
    Open,
    Resolved,
    Monitoring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub severity: IncidentSeverity,
    pub status: IncidentStatus,
    pub auto_created: bool,
    pub monitor_id: Uuid,
    pub service_id: Option<Uuid>,
    pub organization_id: Uuid,
    #[serde(default)]
    pub affected_service_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Insert payload for a new incident row.
#[derive(Debug, Clone, Serialize)]
pub struct NewIncident {
    pub title: String,
    pub description: String,
    pub severity: IncidentSeverity,
    pub status: IncidentStatus,
    pub auto_created: bool,
    pub monitor_id: Uuid,
    pub service_id: Option<Uuid>,
    pub organization_id: Uuid,
    pub affected_service_ids: Vec<Uuid>,
}
