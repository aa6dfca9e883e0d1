// libs/appointment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use identity_cell::models::{AuthenticatedPrincipal, DirectoryUser, IdentityError, Role};

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// A scheduled service booking. The id is assigned by the store on insert;
/// a missing therapist means the booking is unassigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub customer_id: Uuid,
    pub therapist_id: Option<Uuid>,
    pub service_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub price: Option<f64>,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    /// End of the effective interval: a booking without an explicit end
    /// time occupies one hour.
    pub fn effective_end_time(&self) -> DateTime<Utc> {
        self.end_time.unwrap_or_else(|| self.start_time + Duration::hours(1))
    }
}

/// Serialised as the PascalCase variant name, matching the stored rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AppointmentStatus {
    Booked,
    Cancelled,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Booked => write!(f, "Booked"),
            AppointmentStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub customer_id: Uuid,
    pub service_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub price: Option<f64>,
    pub therapist_id: Option<Uuid>,
}

/// Appointment with the party identities attached for display. Built by an
/// explicit join step in the store adapter; the filter logic never touches
/// the embedded users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentView {
    pub appointment: Appointment,
    pub customer: Option<DirectoryUser>,
    pub therapist: Option<DirectoryUser>,
}

// ==============================================================================
// VISIBILITY
// ==============================================================================

/// Which appointments a resolved caller may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityScope {
    AssignedTherapist(Uuid),
    AllAppointments,
    OwnBookings(Uuid),
}

impl VisibilityScope {
    /// Therapist assignment wins over any other role the caller holds;
    /// receptionists, managers and admins see everything; everyone else is
    /// limited to their own bookings.
    pub fn for_principal(principal: &AuthenticatedPrincipal) -> Self {
        if principal.holds(Role::Therapist) {
            VisibilityScope::AssignedTherapist(principal.user_id)
        } else if principal.holds_any(&[Role::Receptionist, Role::Manager, Role::Admin]) {
            VisibilityScope::AllAppointments
        } else {
            VisibilityScope::OwnBookings(principal.user_id)
        }
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

/// The only hard failure is a bad therapist reference at creation time;
/// every other negative outcome is a `false` or empty result.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Selected user is not a valid therapist")]
    InvalidAssignment,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<IdentityError> for AppointmentError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
        }
    }
}
