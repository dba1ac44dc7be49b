pub mod error;
pub mod memory;
pub mod repositories;
pub mod supabase;

pub use error::DatabaseError;
pub use repositories::{IncidentRepository, MonitorRepository, MonitoringResultStore};
