// libs/identity-cell/src/handlers.rs
use std::sync::Arc;

use axum::{extract::State, Json};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::Role;
use crate::services::directory::UserDirectoryService;

/// Resolved identity of the caller: stable user id plus role names.
#[axum::debug_handler]
pub async fn get_me(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let directory = UserDirectoryService::new(&state);

    let principal = directory.resolve_principal(auth.token()).await
        .map_err(|e| AppError::Database(e.to_string()))?
        .ok_or_else(|| AppError::Auth("Unable to resolve caller identity".to_string()))?;

    let mut roles: Vec<&str> = principal.roles.iter().map(|r| r.as_str()).collect();
    roles.sort_unstable();

    Ok(Json(json!({
        "user_id": principal.user_id,
        "roles": roles
    })))
}

/// Therapist directory for the booking page.
#[axum::debug_handler]
pub async fn list_therapists(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let directory = UserDirectoryService::new(&state);

    let therapists = directory.users_in_role(Role::Therapist, auth.token()).await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(json!({
        "therapists": therapists,
        "total": therapists.len()
    })))
}
