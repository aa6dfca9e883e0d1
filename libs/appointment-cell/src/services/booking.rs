// libs/appointment-cell/src/services/booking.rs
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use identity_cell::models::{DirectoryUser, Role};
use identity_cell::services::directory::UserDirectoryService;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, AppointmentView,
    CreateAppointmentRequest, VisibilityScope,
};

const MAX_SERVICE_NAME_CHARS: usize = 100;
const MAX_PRICE: f64 = 10_000.0;

pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    directory: UserDirectoryService,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        let directory = UserDirectoryService::with_client(Arc::clone(&supabase));

        Self { supabase, directory }
    }

    /// Book a service. An assigned therapist must exist and hold the
    /// Therapist role at this moment; role changes afterwards are not
    /// re-validated. No overlap check is performed against existing
    /// bookings for the same therapist.
    pub async fn create_appointment(
        &self,
        request: CreateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Booking {} for customer {} at {}",
               request.service_name, request.customer_id, request.start_time);

        self.validate_create_request(&request)?;

        if let Some(therapist_id) = request.therapist_id {
            self.validate_therapist_assignment(therapist_id, auth_token).await?;
        }

        let appointment_data = json!({
            "customer_id": request.customer_id,
            "therapist_id": request.therapist_id,
            "service_name": request.service_name,
            "start_time": request.start_time.to_rfc3339(),
            "end_time": request.end_time.map(|t| t.to_rfc3339()),
            "price": request.price,
            "status": AppointmentStatus::Booked.to_string(),
            "created_at": Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            Some(auth_token),
            Some(appointment_data),
            Some(headers),
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::DatabaseError("Failed to create appointment".to_string()));
        }

        let appointment: Appointment = serde_json::from_value(result[0].clone())
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse created appointment: {}", e)))?;

        info!("Appointment {} booked for customer {}", appointment.id, appointment.customer_id);
        Ok(appointment)
    }

    /// Appointments visible to the caller, ordered by start time. An
    /// unresolvable principal sees an empty list.
    pub async fn appointments_for_user(
        &self,
        auth_token: &str,
    ) -> Result<Vec<AppointmentView>, AppointmentError> {
        let principal = match self.directory.resolve_principal(auth_token).await? {
            Some(p) => p,
            None => return Ok(vec![]),
        };

        let scope = VisibilityScope::for_principal(&principal);
        let appointments = self.query_appointments(scope, None, None, auth_token).await?;

        self.materialize_views(appointments, auth_token).await
    }

    /// Same visibility rule, constrained to bookings starting at or after
    /// `from_utc` (the current time when not given).
    pub async fn upcoming_appointments_for_user(
        &self,
        from_utc: Option<DateTime<Utc>>,
        auth_token: &str,
    ) -> Result<Vec<AppointmentView>, AppointmentError> {
        let principal = match self.directory.resolve_principal(auth_token).await? {
            Some(p) => p,
            None => return Ok(vec![]),
        };

        let from = from_utc.unwrap_or_else(Utc::now);
        let scope = VisibilityScope::for_principal(&principal);
        let appointments = self.query_appointments(scope, Some(from), None, auth_token).await?;

        self.materialize_views(appointments, auth_token).await
    }

    /// Full day schedule for front-desk staff. Callers outside
    /// Receptionist/Manager/Admin (therapists included) get an empty list.
    pub async fn appointments_for_date(
        &self,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<AppointmentView>, AppointmentError> {
        let principal = match self.directory.resolve_principal(auth_token).await? {
            Some(p) => p,
            None => return Ok(vec![]),
        };

        if !principal.holds_any(&[Role::Receptionist, Role::Manager, Role::Admin]) {
            warn!("User {} denied access to the daily schedule", principal.user_id);
            return Ok(vec![]);
        }

        let day_start = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
        let day_end = day_start + ChronoDuration::days(1);

        let appointments = self.query_appointments(
            VisibilityScope::AllAppointments,
            Some(day_start),
            Some(day_end),
            auth_token,
        ).await?;

        self.materialize_views(appointments, auth_token).await
    }

    /// Cancel a booking. Staff may cancel any appointment; a customer only
    /// their own. Missing appointment and denied caller both come back as
    /// `false`; cancelling twice is a no-op success.
    pub async fn cancel_appointment(
        &self,
        appointment_id: i64,
        auth_token: &str,
    ) -> Result<bool, AppointmentError> {
        let principal = match self.directory.resolve_principal(auth_token).await? {
            Some(p) => p,
            None => {
                debug!("Cancellation of appointment {} with unresolvable principal", appointment_id);
                return Ok(false);
            }
        };

        let appointment = match self.find_by_id(appointment_id, auth_token).await? {
            Some(a) => a,
            None => return Ok(false),
        };

        let is_staff = principal.roles.iter().any(|r| r.is_staff());
        if !is_staff && appointment.customer_id != principal.user_id {
            warn!("User {} denied cancellation of appointment {}", principal.user_id, appointment_id);
            return Ok(false);
        }

        if appointment.status == AppointmentStatus::Cancelled {
            return Ok(true);
        }

        let update_data = json!({
            "status": AppointmentStatus::Cancelled.to_string()
        });

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(update_data),
            Some(headers),
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::DatabaseError("Failed to update appointment".to_string()));
        }

        info!("Appointment {} cancelled by user {}", appointment_id, principal.user_id);
        Ok(true)
    }

    pub async fn find_by_id(
        &self,
        appointment_id: i64,
        auth_token: &str,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Ok(None);
        }

        let appointment: Appointment = serde_json::from_value(result[0].clone())
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))?;

        Ok(Some(appointment))
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn query_appointments(
        &self,
        scope: VisibilityScope,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut query_parts = Vec::new();

        match scope {
            VisibilityScope::AssignedTherapist(therapist_id) => {
                query_parts.push(format!("therapist_id=eq.{}", therapist_id));
            }
            VisibilityScope::OwnBookings(customer_id) => {
                query_parts.push(format!("customer_id=eq.{}", customer_id));
            }
            VisibilityScope::AllAppointments => {}
        }

        if let Some(from) = from {
            let date_str = from.to_rfc3339();
            let encoded_date = urlencoding::encode(&date_str);
            query_parts.push(format!("start_time=gte.{}", encoded_date));
        }
        if let Some(until) = until {
            let date_str = until.to_rfc3339();
            let encoded_date = urlencoding::encode(&date_str);
            query_parts.push(format!("start_time=lt.{}", encoded_date));
        }

        query_parts.push("order=start_time.asc".to_string());

        let path = format!("/rest/v1/appointments?{}", query_parts.join("&"));
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let appointments: Vec<Appointment> = result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e)))?;

        Ok(appointments)
    }

    /// Join step: attach customer and therapist identities for display.
    async fn materialize_views(
        &self,
        appointments: Vec<Appointment>,
        auth_token: &str,
    ) -> Result<Vec<AppointmentView>, AppointmentError> {
        if appointments.is_empty() {
            return Ok(vec![]);
        }

        let mut party_ids = HashSet::new();
        for appointment in &appointments {
            party_ids.insert(appointment.customer_id);
            if let Some(therapist_id) = appointment.therapist_id {
                party_ids.insert(therapist_id);
            }
        }

        let id_strings: Vec<String> = party_ids.iter().map(Uuid::to_string).collect();
        let id_refs: Vec<&str> = id_strings.iter().map(String::as_str).collect();

        let users = self.directory.find_users_by_ids(&id_refs, auth_token).await?;
        let by_id: HashMap<Uuid, DirectoryUser> = users.into_iter()
            .map(|user| (user.id, user))
            .collect();

        let views = appointments.into_iter()
            .map(|appointment| {
                let customer = by_id.get(&appointment.customer_id).cloned();
                let therapist = appointment.therapist_id.and_then(|id| by_id.get(&id).cloned());
                AppointmentView { appointment, customer, therapist }
            })
            .collect();

        Ok(views)
    }

    async fn validate_therapist_assignment(
        &self,
        therapist_id: Uuid,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let therapist = self.directory.find_user_by_id(therapist_id, auth_token).await?;
        if therapist.is_none() {
            warn!("Rejected booking with unknown therapist {}", therapist_id);
            return Err(AppointmentError::InvalidAssignment);
        }

        let roles = self.directory.roles_of(therapist_id, auth_token).await?;
        if !roles.contains(&Role::Therapist) {
            warn!("Rejected booking: user {} does not hold the Therapist role", therapist_id);
            return Err(AppointmentError::InvalidAssignment);
        }

        Ok(())
    }

    fn validate_create_request(&self, request: &CreateAppointmentRequest) -> Result<(), AppointmentError> {
        if request.service_name.trim().is_empty() {
            return Err(AppointmentError::ValidationError("Service name is required".to_string()));
        }

        if request.service_name.chars().count() > MAX_SERVICE_NAME_CHARS {
            return Err(AppointmentError::ValidationError(
                format!("Service name cannot exceed {} characters", MAX_SERVICE_NAME_CHARS)
            ));
        }

        if let Some(price) = request.price {
            if !(0.0..=MAX_PRICE).contains(&price) {
                return Err(AppointmentError::ValidationError(
                    format!("Price must be between 0 and {}", MAX_PRICE)
                ));
            }
        }

        Ok(())
    }
}
