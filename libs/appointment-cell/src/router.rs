// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn appointment_routes(state: Arc<AppConfig>) -> Router {
    // All appointment operations require authentication
    let protected_routes = Router::new()
        .route("/", post(handlers::book_appointment))
        .route("/mine", get(handlers::get_my_appointments))
        .route("/upcoming", get(handlers::get_upcoming_appointments))
        .route("/date/{date}", get(handlers::get_appointments_for_date))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/therapists/available", get(handlers::get_available_therapists))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
