pub mod failure_tracker;
pub mod lifecycle;

pub use failure_tracker::{FailureTrackerService, CRITICAL_FAILURE_CEILING, FAILED_PING_LOG_CAP};
pub use lifecycle::{IncidentLifecycleService, INCIDENT_THRESHOLDS};
