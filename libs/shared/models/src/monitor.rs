use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Health verdict for a single probe. Serialized in its wire form
/// (`"UP"` / `"DEGRADED"` / `"DOWN"`) everywhere it crosses a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MonitorStatus {
    Up,
    Degraded,
    Down,
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MonitorStatus::Up => "UP",
            MonitorStatus::Degraded => "DEGRADED",
            MonitorStatus::Down => "DOWN",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorHeader {
    pub key: String,
    pub value: String,
}

/// Snapshot of a configured health check, denormalized with its owning
/// service and organization. Owned by the external management surface;
/// the core only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub method: String,
    /// Polling interval in seconds.
    pub interval: u64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub headers: Vec<MonitorHeader>,
    pub active: bool,
    /// Response-time ceiling in milliseconds before a healthy response
    /// counts as DEGRADED.
    pub degraded_threshold: u64,
    /// Request timeout in milliseconds.
    pub timeout: u64,
    pub service_id: Uuid,
    pub service_name: Option<String>,
    pub organization_id: Option<Uuid>,
}

/// Outcome of one probe, appended to the monitoring-result store.
/// Response time and status code are absent on transport failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringResult {
    pub monitor_id: Uuid,
    pub checked_at: DateTime<Utc>,
    pub status: MonitorStatus,
    pub response_time_ms: Option<u64>,
    pub http_status_code: Option<u16>,
    pub error: Option<String>,
}

/// Compact failure record kept in the failure tracker's bounded log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedPing {
    pub checked_at: DateTime<Utc>,
    pub response_time_ms: Option<u64>,
    pub http_status_code: Option<u16>,
    pub error: Option<String>,
}
