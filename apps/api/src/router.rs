use std::sync::Arc;

use axum::{routing::get, Router};

use realtime_cell::{realtime_routes, ConnectionFanout};

pub fn create_router(fanout: Arc<ConnectionFanout>) -> Router {
    Router::new()
        .route("/", get(|| async { "Status Deck monitoring API is running!" }))
        .merge(realtime_routes(fanout))
}
