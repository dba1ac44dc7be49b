pub mod error;
pub mod services;

pub use error::IncidentError;
pub use services::*;
