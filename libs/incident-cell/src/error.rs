use thiserror::Error;
use uuid::Uuid;

use shared_database::DatabaseError;

#[derive(Error, Debug)]
pub enum IncidentError {
    #[error("Monitor {0} not found")]
    MonitorNotFound(Uuid),

    #[error("Monitor {0} has no resolvable service/organization linkage")]
    MissingLinkage(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
