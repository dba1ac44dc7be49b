use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use tracing::{debug, error, info, instrument, warn};

use incident_cell::{FailureTrackerService, IncidentLifecycleService};
use realtime_cell::EventBus;
use shared_database::{
    DatabaseError, MonitorRepository, MonitoringResultStore,
};
use shared_models::{
    FailedPing, Monitor, MonitorStatus, MonitorUpdateEvent, MonitoringResult,
    MONITOR_UPDATES_CHANNEL,
};

use crate::error::MonitorError;
use crate::services::classifier::classify_status;

/// Fallback request timeout when a monitor has none configured.
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone)]
pub struct ProberConfig {
    /// Attempts for a result write that keeps hitting the referential race.
    pub result_write_retries: u32,
    /// Backoff before the first retry; doubles per attempt.
    pub result_write_backoff: Duration,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            result_write_retries: 3,
            result_write_backoff: Duration::from_secs(2),
        }
    }
}

/// Executes one bounded HTTP probe per invocation: classify the exchange,
/// persist the outcome, feed the failure tracker and incident lifecycle, and
/// broadcast the update. Nothing in this pipeline is allowed to propagate an
/// error back into the scheduler.
pub struct ProberService {
    http: Client,
    config: ProberConfig,
    monitors: Arc<dyn MonitorRepository>,
    results: Arc<dyn MonitoringResultStore>,
    failures: Arc<FailureTrackerService>,
    incidents: Arc<IncidentLifecycleService>,
    bus: Arc<dyn EventBus>,
}

impl ProberService {
    pub fn new(
        monitors: Arc<dyn MonitorRepository>,
        results: Arc<dyn MonitoringResultStore>,
        failures: Arc<FailureTrackerService>,
        incidents: Arc<IncidentLifecycleService>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            http: Client::new(),
            config: ProberConfig::default(),
            monitors,
            results,
            failures,
            incidents,
            bus,
        }
    }

    pub fn with_config(mut self, config: ProberConfig) -> Self {
        self.config = config;
        self
    }

    #[instrument(skip(self, monitor), fields(monitor_id = %monitor.id, url = %monitor.url))]
    pub async fn probe(&self, monitor: &Monitor) -> MonitoringResult {
        let outcome = match self.execute_probe(monitor).await {
            Ok(outcome) => outcome,
            Err(MonitorError::Transport(detail)) => {
                warn!(monitor_id = %monitor.id, error = %detail, "probe transport failure");
                MonitoringResult {
                    monitor_id: monitor.id,
                    checked_at: Utc::now(),
                    status: MonitorStatus::Down,
                    response_time_ms: None,
                    http_status_code: None,
                    error: Some(detail),
                }
            }
            Err(e) => {
                warn!(monitor_id = %monitor.id, error = %e, "probe failed");
                MonitoringResult {
                    monitor_id: monitor.id,
                    checked_at: Utc::now(),
                    status: MonitorStatus::Down,
                    response_time_ms: None,
                    http_status_code: None,
                    error: Some(e.to_string()),
                }
            }
        };

        info!(
            monitor_id = %monitor.id,
            name = %monitor.name,
            status = %outcome.status,
            response_time_ms = ?outcome.response_time_ms,
            "probe completed"
        );

        self.safe_record(&outcome).await;

        if outcome.status != MonitorStatus::Up {
            self.failures
                .append_failure(
                    monitor.id,
                    FailedPing {
                        checked_at: outcome.checked_at,
                        response_time_ms: outcome.response_time_ms,
                        http_status_code: outcome.http_status_code,
                        error: outcome.error.clone(),
                    },
                )
                .await;
        }

        if let Err(e) = self
            .incidents
            .handle_status_change(monitor.id, outcome.status)
            .await
        {
            warn!(monitor_id = %monitor.id, error = %e, "incident evaluation failed");
        }

        self.publish_monitor_update(monitor.id, &outcome).await;

        outcome
    }

    async fn execute_probe(&self, monitor: &Monitor) -> Result<MonitoringResult, MonitorError> {
        let method = Method::from_bytes(monitor.method.as_bytes()).map_err(|e| {
            MonitorError::Transport(format!("invalid method {}: {}", monitor.method, e))
        })?;

        let mut headers = HeaderMap::new();
        for header in &monitor.headers {
            let name = HeaderName::from_bytes(header.key.as_bytes()).map_err(|e| {
                MonitorError::Transport(format!("invalid header name {}: {}", header.key, e))
            })?;
            let value = HeaderValue::from_str(&header.value).map_err(|e| {
                MonitorError::Transport(format!("invalid header value for {}: {}", header.key, e))
            })?;
            headers.insert(name, value);
        }

        let timeout = Duration::from_millis(if monitor.timeout == 0 {
            DEFAULT_PROBE_TIMEOUT_MS
        } else {
            monitor.timeout
        });

        let started = Instant::now();
        let response = self
            .http
            .request(method, &monitor.url)
            .headers(headers)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| MonitorError::Transport(e.to_string()))?;
        let response_time_ms = started.elapsed().as_millis() as u64;

        let http_status = response.status().as_u16();
        let (status, error) = if response.status().is_client_error()
            || response.status().is_server_error()
        {
            (
                MonitorStatus::Down,
                Some(format!("HTTP error {}", http_status)),
            )
        } else {
            (
                classify_status(http_status, response_time_ms, monitor.degraded_threshold),
                None,
            )
        };

        Ok(MonitoringResult {
            monitor_id: monitor.id,
            checked_at: Utc::now(),
            status,
            response_time_ms: Some(response_time_ms),
            http_status_code: Some(http_status),
            error,
        })
    }

    /// Persists the outcome, tolerating the monitor disappearing mid-flight:
    /// a missing row skips the write silently, a foreign key race is retried
    /// with exponential backoff, anything else is logged and dropped.
    async fn safe_record(&self, outcome: &MonitoringResult) {
        match self.monitors.find_by_id(outcome.monitor_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!(
                    monitor_id = %outcome.monitor_id,
                    "monitor no longer exists, skipping result write"
                );
                return;
            }
            Err(e) => {
                error!(
                    monitor_id = %outcome.monitor_id,
                    error = %e,
                    "failed to check monitor before result write"
                );
                return;
            }
        }

        let mut delay = self.config.result_write_backoff;
        for attempt in 1..=self.config.result_write_retries {
            match self.results.insert(outcome).await {
                Ok(()) => {
                    debug!(monitor_id = %outcome.monitor_id, "monitoring result stored");
                    return;
                }
                Err(DatabaseError::ForeignKeyViolation(detail)) => {
                    warn!(
                        monitor_id = %outcome.monitor_id,
                        attempt,
                        retries = self.config.result_write_retries,
                        error = %detail,
                        "foreign key violation on result write, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => {
                    error!(
                        monitor_id = %outcome.monitor_id,
                        error = %e,
                        "unexpected error while storing monitoring result"
                    );
                    return;
                }
            }
        }

        error!(
            monitor_id = %outcome.monitor_id,
            retries = self.config.result_write_retries,
            "failed to store monitoring result, giving up"
        );
    }

    /// Broadcasts the latest outcome with the monitor's current display
    /// metadata. The snapshot is re-read so renames or edits made during the
    /// probe are reflected; a deleted monitor publishes nothing.
    async fn publish_monitor_update(&self, monitor_id: uuid::Uuid, outcome: &MonitoringResult) {
        let snapshot = match self.monitors.find_by_id(monitor_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return,
            Err(e) => {
                warn!(%monitor_id, error = %e, "failed to load monitor for update event");
                return;
            }
        };

        let event = MonitorUpdateEvent::new(&snapshot, outcome);
        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(e) => {
                error!(%monitor_id, error = %e, "failed to serialize monitor update");
                return;
            }
        };

        if let Err(e) = self.bus.publish(MONITOR_UPDATES_CHANNEL, &payload).await {
            warn!(%monitor_id, error = %e, "failed to publish monitor update");
        }
    }
}
