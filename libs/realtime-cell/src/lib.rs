pub mod error;
pub mod handlers;
pub mod router;
pub mod services;

pub use error::RealtimeError;
pub use router::realtime_routes;
pub use services::*;
