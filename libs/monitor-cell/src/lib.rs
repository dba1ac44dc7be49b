pub mod error;
pub mod services;

pub use error::MonitorError;
pub use services::*;
