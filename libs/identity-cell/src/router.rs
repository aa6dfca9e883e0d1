// libs/identity-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::get,
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn identity_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/me", get(handlers::get_me))
        .route("/therapists", get(handlers::list_therapists))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
