use thiserror::Error;

use realtime_cell::RealtimeError;
use shared_database::DatabaseError;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Probe transport failure: {0}")]
    Transport(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Event bus error: {0}")]
    Bus(#[from] RealtimeError),
}
