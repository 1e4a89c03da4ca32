// libs/appointment-cell/src/services/conflict.rs
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError};

/// Finds appointments that hold a dentist's calendar in a given interval.
/// This check is only meaningful under the dentist's CalendarGuard lock;
/// on its own it is a stale snapshot.
pub struct ConflictDetectionService {
    supabase: SupabaseClient,
}

impl ConflictDetectionService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Calendar holds for the dentist colliding with `[start_time, end_time)`,
    /// excluding the appointment being edited when one is given.
    pub async fn find_conflicts(
        &self,
        dentist_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!(
            "Checking conflicts for dentist {} from {} to {}",
            dentist_id, start_time, end_time
        );

        let mut query_parts = vec![
            format!("dentist_id=eq.{}", dentist_id),
            "status=in.(pending_approval,pending_reschedule,confirmed)".to_string(),
            format!("start_time=lt.{}", urlencoding::encode(&end_time.to_rfc3339())),
            format!("end_time=gt.{}", urlencoding::encode(&start_time.to_rfc3339())),
            "order=start_time.asc".to_string(),
        ];
        if let Some(exclude_id) = exclude_appointment_id {
            query_parts.push(format!("id=neq.{}", exclude_id));
        }

        let path = format!("/rest/v1/appointments?{}", query_parts.join("&"));
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let appointments: Vec<Appointment> = rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        // The range filters pre-select; the half-open comparison decides.
        let conflicts: Vec<Appointment> = appointments
            .into_iter()
            .filter(|apt| {
                apt.status.holds_calendar()
                    && intervals_overlap(start_time, end_time, apt.start_time, apt.end_time)
            })
            .collect();

        if !conflicts.is_empty() {
            warn!(
                "Conflict detected for dentist {}: {} overlapping appointments",
                dentist_id,
                conflicts.len()
            );
        }

        Ok(conflicts)
    }
}

/// Half-open overlap: `[a1, a2)` and `[b1, b2)` collide iff a1 < b2 and
/// b1 < a2. Back-to-back intervals never collide.
pub fn intervals_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}
