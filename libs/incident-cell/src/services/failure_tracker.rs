use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_models::FailedPing;

/// Once a monitor's consecutive failure count reaches this ceiling it stops
/// incrementing until explicitly reset.
pub const CRITICAL_FAILURE_CEILING: u32 = 12;

/// Maximum failed pings retained per monitor; older entries are discarded
/// first.
pub const FAILED_PING_LOG_CAP: usize = 50;

#[derive(Debug, Default)]
struct FailureEntry {
    count: u32,
    first_down_at: Option<DateTime<Utc>>,
    failed_pings: Vec<FailedPing>,
}

/// Ephemeral per-monitor failure state: consecutive non-UP count, the
/// timestamp of the first failure in the current streak, and a bounded log
/// of recent failures. Probes for the same monitor may overlap, so every
/// mutation happens under one write lock; `reset` clears everything in a
/// single critical section so readers never observe a half-cleared entry.
pub struct FailureTrackerService {
    entries: Arc<RwLock<HashMap<Uuid, FailureEntry>>>,
}

impl FailureTrackerService {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Bumps the consecutive failure count and returns the new value. The
    /// first failure of a streak stamps `first_down_at`. At the critical
    /// ceiling the count saturates and the ceiling is returned unchanged.
    pub async fn increment(&self, monitor_id: Uuid) -> u32 {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(monitor_id).or_insert_with(|| FailureEntry {
            count: 0,
            first_down_at: Some(Utc::now()),
            failed_pings: Vec::new(),
        });

        if entry.count >= CRITICAL_FAILURE_CEILING {
            debug!(%monitor_id, "failure count already at critical ceiling, not incrementing");
            return CRITICAL_FAILURE_CEILING;
        }

        entry.count += 1;
        debug!(%monitor_id, count = entry.count, "consecutive failure count");
        entry.count
    }

    /// Clears the count, failure log, and first-down timestamp together.
    pub async fn reset(&self, monitor_id: Uuid) {
        let mut entries = self.entries.write().await;
        if entries.remove(&monitor_id).is_some() {
            debug!(%monitor_id, "failure state reset");
        }
    }

    /// Current consecutive failure count, 0 when no failures are recorded.
    pub async fn read(&self, monitor_id: Uuid) -> u32 {
        let entries = self.entries.read().await;
        entries.get(&monitor_id).map(|e| e.count).unwrap_or(0)
    }

    pub async fn first_down_at(&self, monitor_id: Uuid) -> Option<DateTime<Utc>> {
        let entries = self.entries.read().await;
        entries.get(&monitor_id).and_then(|e| e.first_down_at)
    }

    /// Appends a failed ping to the monitor's log, evicting the oldest
    /// entries beyond the cap.
    pub async fn append_failure(&self, monitor_id: Uuid, ping: FailedPing) {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(monitor_id).or_insert_with(|| FailureEntry {
            count: 0,
            first_down_at: Some(Utc::now()),
            failed_pings: Vec::new(),
        });

        entry.failed_pings.push(ping);
        if entry.failed_pings.len() > FAILED_PING_LOG_CAP {
            let overflow = entry.failed_pings.len() - FAILED_PING_LOG_CAP;
            entry.failed_pings.drain(..overflow);
        }
    }

    pub async fn failures(&self, monitor_id: Uuid) -> Vec<FailedPing> {
        let entries = self.entries.read().await;
        entries
            .get(&monitor_id)
            .map(|e| e.failed_pings.clone())
            .unwrap_or_default()
    }

    /// Drops only the failed-ping log, leaving the count and first-down
    /// timestamp in place. Used after an incident has captured the log.
    pub async fn clear_failures(&self, monitor_id: Uuid) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(&monitor_id) {
            entry.failed_pings.clear();
        }
    }
}

impl Default for FailureTrackerService {
    fn default() -> Self {
        Self::new()
    }
}
