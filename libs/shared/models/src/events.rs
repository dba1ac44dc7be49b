//! Wire events carried over the event bus. Field names are part of the
//! contract with realtime consumers and must not change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::incident::{Incident, IncidentSeverity, IncidentStatus};
use crate::monitor::{Monitor, MonitorHeader, MonitorStatus, MonitoringResult};

pub const MONITOR_UPDATES_CHANNEL: &str = "monitor_updates_channel";
pub const INCIDENT_UPDATES_CHANNEL: &str = "incident_updates_channel";

/// Control channels feeding the scheduler. The message body is the monitor
/// id as a plain string.
pub const MONITOR_CREATED_CHANNEL: &str = "monitor_created";
pub const MONITOR_UPDATED_CHANNEL: &str = "monitor_updated";
pub const MONITOR_DELETED_CHANNEL: &str = "monitor_deleted";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorUpdateEvent {
    pub organization_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: MonitorUpdatePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorUpdatePayload {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub method: String,
    pub interval: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub headers: Vec<MonitorHeader>,
    pub active: bool,
    pub degraded_threshold: u64,
    pub timeout: u64,
    pub service_id: Uuid,
    pub service_name: Option<String>,
    pub latest_result: LatestResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestResult {
    pub status: MonitorStatus,
    pub response_time_ms: Option<u64>,
    pub http_status_code: Option<u16>,
    pub checked_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl MonitorUpdateEvent {
    /// Builds the broadcast payload for one completed probe. The result's
    /// `checked_at` is restamped at publish time.
    pub fn new(monitor: &Monitor, result: &MonitoringResult) -> Self {
        Self {
            organization_id: monitor.organization_id,
            kind: "monitor_update".to_string(),
            payload: MonitorUpdatePayload {
                id: monitor.id,
                name: monitor.name.clone(),
                url: monitor.url.clone(),
                method: monitor.method.clone(),
                interval: monitor.interval,
                kind: monitor.kind.clone(),
                headers: monitor.headers.clone(),
                active: monitor.active,
                degraded_threshold: monitor.degraded_threshold,
                timeout: monitor.timeout,
                service_id: monitor.service_id,
                service_name: monitor.service_name.clone(),
                latest_result: LatestResult {
                    status: result.status,
                    response_time_ms: result.response_time_ms,
                    http_status_code: result.http_status_code,
                    checked_at: Utc::now(),
                    error: result.error.clone(),
                },
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentEvent {
    pub organization_id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: IncidentEventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentEventPayload {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<IncidentSeverity>,
    pub status: IncidentStatus,
    pub monitor_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_resolved: Option<bool>,
    pub organization_id: Uuid,
}

impl IncidentEvent {
    pub fn created(incident: &Incident, monitor: &Monitor) -> Self {
        Self {
            organization_id: incident.organization_id,
            kind: "incident_created".to_string(),
            payload: IncidentEventPayload {
                id: incident.id,
                title: Some(incident.title.clone()),
                severity: Some(incident.severity),
                status: incident.status,
                monitor_id: incident.monitor_id,
                created_at: Some(incident.created_at),
                resolved_at: None,
                url: Some(monitor.url.clone()),
                method: Some(monitor.method.clone()),
                service_name: monitor.service_name.clone(),
                auto_resolved: None,
                organization_id: incident.organization_id,
            },
        }
    }

    pub fn resolved(incident: &Incident) -> Self {
        Self {
            organization_id: incident.organization_id,
            kind: "incident_resolved".to_string(),
            payload: IncidentEventPayload {
                id: incident.id,
                title: None,
                severity: None,
                status: IncidentStatus::Resolved,
                monitor_id: incident.monitor_id,
                created_at: None,
                resolved_at: incident.resolved_at,
                url: None,
                method: None,
                service_name: None,
                auto_resolved: Some(true),
                organization_id: incident.organization_id,
            },
        }
    }
}
