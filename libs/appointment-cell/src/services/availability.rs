// libs/appointment-cell/src/services/availability.rs
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use identity_cell::models::{DirectoryUser, Role};
use identity_cell::services::directory::UserDirectoryService;

use crate::models::{Appointment, AppointmentError, AppointmentStatus};

pub struct TherapistAvailabilityService {
    supabase: Arc<SupabaseClient>,
    directory: UserDirectoryService,
}

impl TherapistAvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        let directory = UserDirectoryService::with_client(Arc::clone(&supabase));

        Self { supabase, directory }
    }

    /// Therapists free for the whole window `[start_time, end_time)`, in
    /// directory order.
    pub async fn available_therapists(
        &self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<DirectoryUser>, AppointmentError> {
        debug!("Finding available therapists between {} and {}", start_time, end_time);

        let busy = self.busy_therapist_ids(start_time, end_time, auth_token).await?;
        let therapists = self.directory.users_in_role(Role::Therapist, auth_token).await
            .map_err(AppointmentError::from)?;

        Ok(therapists.into_iter()
            .filter(|therapist| !busy.contains(&therapist.id))
            .collect())
    }

    /// Therapists with a non-cancelled booking whose effective interval
    /// overlaps the window. The store prefilters on the start bound; the
    /// effective end (a missing end time counts as one hour) cannot be
    /// expressed in a PostgREST filter, so that half runs here.
    pub async fn busy_therapist_ids(
        &self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<HashSet<Uuid>, AppointmentError> {
        let date_str = end_time.to_rfc3339();
        let encoded_date = urlencoding::encode(&date_str);
        let path = format!(
            "/rest/v1/appointments?therapist_id=not.is.null&status=neq.{}&start_time=lt.{}",
            AppointmentStatus::Cancelled,
            encoded_date,
        );

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

        let mut busy = HashSet::new();
        for appointment in appointments {
            let occupied = intervals_overlap(
                appointment.start_time,
                appointment.effective_end_time(),
                start_time,
                end_time,
            );
            if occupied {
                if let Some(therapist_id) = appointment.therapist_id {
                    busy.insert(therapist_id);
                }
            }
        }

        Ok(busy)
    }
}

/// Strict half-open overlap: `[a_start, a_end)` and `[b_start, b_end)`
/// overlap iff `a_start < b_end && b_start < a_end`.
pub fn intervals_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn overlapping_intervals_are_detected() {
        assert!(intervals_overlap(
            t("2025-03-01T10:00:00Z"), t("2025-03-01T11:00:00Z"),
            t("2025-03-01T10:30:00Z"), t("2025-03-01T10:45:00Z"),
        ));
    }

    #[test]
    fn touching_intervals_do_not_overlap() {
        assert!(!intervals_overlap(
            t("2025-03-01T10:00:00Z"), t("2025-03-01T11:00:00Z"),
            t("2025-03-01T11:00:00Z"), t("2025-03-01T12:00:00Z"),
        ));
        assert!(!intervals_overlap(
            t("2025-03-01T11:00:00Z"), t("2025-03-01T12:00:00Z"),
            t("2025-03-01T10:00:00Z"), t("2025-03-01T11:00:00Z"),
        ));
    }

    #[test]
    fn containment_counts_as_overlap() {
        assert!(intervals_overlap(
            t("2025-03-01T09:00:00Z"), t("2025-03-01T17:00:00Z"),
            t("2025-03-01T12:00:00Z"), t("2025-03-01T12:30:00Z"),
        ));
        assert!(intervals_overlap(
            t("2025-03-01T12:00:00Z"), t("2025-03-01T12:30:00Z"),
            t("2025-03-01T09:00:00Z"), t("2025-03-01T17:00:00Z"),
        ));
    }
}
