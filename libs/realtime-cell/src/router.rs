use std::sync::Arc;

use axum::{routing::get, Router};

use crate::handlers::{incident_updates_ws, monitor_updates_ws};
use crate::services::fanout::ConnectionFanout;

pub fn realtime_routes(fanout: Arc<ConnectionFanout>) -> Router {
    Router::new()
        .route("/ws/monitors/{organization_id}", get(monitor_updates_ws))
        .route("/ws/incidents/{organization_id}", get(incident_updates_ws))
        .with_state(fanout)
}
