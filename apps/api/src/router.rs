use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::appointment_routes;
use identity_cell::router::identity_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Spa booking API is running!" }))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/identity", identity_routes(state.clone()))
}
