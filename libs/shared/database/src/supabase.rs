use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{
    Incident, IncidentSeverity, Monitor, MonitorHeader, MonitoringResult, NewIncident,
};

use crate::error::DatabaseError;
use crate::repositories::{IncidentRepository, MonitorRepository, MonitoringResultStore};

const MONITOR_SELECT: &str =
    "id,name,url,method,interval,type,headers,active,degraded_threshold,timeout,service_id,\
     service:services(name,organization_id)";

/// Thin PostgREST client. Writes carry `Prefer: return=representation` so
/// the affected rows come back in the response body.
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, method: &Method) -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.anon_key).unwrap());
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.anon_key)).unwrap(),
        );

        if *method == Method::POST || *method == Method::PATCH {
            headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        }

        headers
    }

    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, DatabaseError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);

        let headers = self.get_headers(&method);

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                409 => DatabaseError::ForeignKeyViolation(error_text),
                code => DatabaseError::Api {
                    status: code,
                    message: error_text,
                },
            });
        }

        let data = response.json::<T>().await?;
        Ok(data)
    }
}

/// Monitor row as PostgREST returns it, with the embedded service resource.
#[derive(Debug, Deserialize)]
struct MonitorRow {
    id: Uuid,
    name: String,
    url: String,
    method: String,
    interval: u64,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    headers: Vec<MonitorHeader>,
    active: bool,
    degraded_threshold: u64,
    timeout: u64,
    service_id: Uuid,
    service: Option<ServiceRow>,
}

#[derive(Debug, Deserialize)]
struct ServiceRow {
    name: String,
    organization_id: Uuid,
}

impl From<MonitorRow> for Monitor {
    fn from(row: MonitorRow) -> Self {
        let (service_name, organization_id) = match row.service {
            Some(service) => (Some(service.name), Some(service.organization_id)),
            None => (None, None),
        };

        Monitor {
            id: row.id,
            name: row.name,
            url: row.url,
            method: row.method,
            interval: row.interval,
            kind: row.kind,
            headers: row.headers,
            active: row.active,
            degraded_threshold: row.degraded_threshold,
            timeout: row.timeout,
            service_id: row.service_id,
            service_name,
            organization_id,
        }
    }
}

pub struct SupabaseMonitorRepository {
    client: Arc<SupabaseClient>,
}

impl SupabaseMonitorRepository {
    pub fn new(client: Arc<SupabaseClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MonitorRepository for SupabaseMonitorRepository {
    async fn find_active(&self) -> Result<Vec<Monitor>, DatabaseError> {
        let path = format!("/rest/v1/monitors?active=eq.true&select={}", MONITOR_SELECT);
        let rows: Vec<MonitorRow> = self.client.request(Method::GET, &path, None).await?;
        Ok(rows.into_iter().map(Monitor::from).collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Monitor>, DatabaseError> {
        let path = format!(
            "/rest/v1/monitors?id=eq.{}&select={}&limit=1",
            id, MONITOR_SELECT
        );
        let rows: Vec<MonitorRow> = self.client.request(Method::GET, &path, None).await?;
        Ok(rows.into_iter().next().map(Monitor::from))
    }
}

pub struct SupabaseMonitoringResultStore {
    client: Arc<SupabaseClient>,
}

impl SupabaseMonitoringResultStore {
    pub fn new(client: Arc<SupabaseClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MonitoringResultStore for SupabaseMonitoringResultStore {
    async fn insert(&self, result: &MonitoringResult) -> Result<(), DatabaseError> {
        let body = serde_json::to_value(result)?;
        let _: Vec<Value> = self
            .client
            .request(Method::POST, "/rest/v1/monitoring_results", Some(body))
            .await?;
        Ok(())
    }
}

pub struct SupabaseIncidentRepository {
    client: Arc<SupabaseClient>,
}

impl SupabaseIncidentRepository {
    pub fn new(client: Arc<SupabaseClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IncidentRepository for SupabaseIncidentRepository {
    async fn find_open_auto_incident(
        &self,
        monitor_id: Uuid,
    ) -> Result<Option<Incident>, DatabaseError> {
        let path = format!(
            "/rest/v1/incidents?monitor_id=eq.{}&status=eq.OPEN&auto_created=eq.true&limit=1",
            monitor_id
        );
        let rows: Vec<Incident> = self.client.request(Method::GET, &path, None).await?;
        Ok(rows.into_iter().next())
    }

    async fn create(&self, incident: NewIncident) -> Result<Incident, DatabaseError> {
        let body = serde_json::to_value(&incident)?;
        let mut rows: Vec<Incident> = self
            .client
            .request(Method::POST, "/rest/v1/incidents", Some(body))
            .await?;

        rows.pop().ok_or(DatabaseError::Api {
            status: 500,
            message: "incident insert returned no representation".to_string(),
        })
    }

    async fn escalate(&self, id: Uuid, severity: IncidentSeverity) -> Result<(), DatabaseError> {
        let path = format!("/rest/v1/incidents?id=eq.{}", id);
        let body = json!({ "severity": severity });
        let _: Vec<Value> = self.client.request(Method::PATCH, &path, Some(body)).await?;
        Ok(())
    }

    async fn resolve(
        &self,
        id: Uuid,
        resolved_at: DateTime<Utc>,
    ) -> Result<Incident, DatabaseError> {
        let path = format!("/rest/v1/incidents?id=eq.{}", id);
        let body = json!({ "status": "RESOLVED", "resolved_at": resolved_at });
        let mut rows: Vec<Incident> = self.client.request(Method::PATCH, &path, Some(body)).await?;

        rows.pop().ok_or(DatabaseError::Api {
            status: 500,
            message: "incident update returned no representation".to_string(),
        })
    }
}
