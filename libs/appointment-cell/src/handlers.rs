// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{AppointmentError, CreateAppointmentRequest};
use crate::services::availability::TherapistAvailabilityService;
use crate::services::booking::AppointmentBookingService;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct UpcomingQueryParams {
    pub from_utc: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQueryParams {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

/// Customers book for themselves; staff may book on a customer's behalf.
#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let is_self = request.customer_id.to_string() == user.id;
    let is_staff = matches!(
        user.role.as_deref(),
        Some("Therapist" | "Receptionist" | "Manager" | "Admin")
    );

    if !is_self && !is_staff {
        return Err(AppError::Auth("Not authorized to book for this customer".to_string()));
    }

    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service.create_appointment(request, token).await
        .map_err(|e| match e {
            AppointmentError::InvalidAssignment => {
                AppError::BadRequest("Selected user is not a valid therapist".to_string())
            },
            AppointmentError::ValidationError(msg) => AppError::BadRequest(msg),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        })?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn get_my_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let booking_service = AppointmentBookingService::new(&state);

    let appointments = booking_service.appointments_for_user(auth.token()).await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_upcoming_appointments(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<UpcomingQueryParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let booking_service = AppointmentBookingService::new(&state);

    let appointments = booking_service
        .upcoming_appointments_for_user(params.from_utc, auth.token()).await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

/// Front-desk day view; non-staff callers get an empty schedule.
#[axum::debug_handler]
pub async fn get_appointments_for_date(
    State(state): State<Arc<AppConfig>>,
    Path(date): Path<NaiveDate>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let booking_service = AppointmentBookingService::new(&state);

    let appointments = booking_service.appointments_for_date(date, auth.token()).await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(json!({
        "date": date,
        "appointments": appointments,
        "total": appointments.len()
    })))
}

/// The boolean result deliberately does not distinguish a missing
/// appointment from a denied caller.
#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<i64>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let booking_service = AppointmentBookingService::new(&state);

    let cancelled = booking_service.cancel_appointment(appointment_id, auth.token()).await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(json!({
        "cancelled": cancelled
    })))
}

#[axum::debug_handler]
pub async fn get_available_therapists(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<AvailabilityQueryParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let availability_service = TherapistAvailabilityService::new(&state);

    let therapists = availability_service
        .available_therapists(params.start_time, params.end_time, auth.token()).await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(json!({
        "therapists": therapists,
        "total": therapists.len()
    })))
}
