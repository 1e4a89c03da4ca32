// libs/appointment-cell/src/services/notify.rs
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError, NotificationType};

/// Persists lifecycle notifications for the patient. Dispatch is strictly
/// best-effort: a committed status change is never rolled back or failed
/// because the notification row could not be written.
pub struct NotificationService {
    supabase: SupabaseClient,
}

impl NotificationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn dispatch(
        &self,
        user_id: Uuid,
        kind: NotificationType,
        appointment: &Appointment,
        auth_token: &str,
    ) {
        if let Err(e) = self
            .create_notification(user_id, kind, appointment, auth_token)
            .await
        {
            warn!(
                "Failed to deliver {} notification for appointment {}: {}",
                kind, appointment.id, e
            );
        }
    }

    async fn create_notification(
        &self,
        user_id: Uuid,
        kind: NotificationType,
        appointment: &Appointment,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let when = appointment.start_time.format("%Y-%m-%d %H:%M");
        let (title, message) = match kind {
            NotificationType::AppointmentConfirmed => (
                "Appointment confirmed",
                format!("Your appointment on {} has been confirmed.", when),
            ),
            NotificationType::AppointmentRescheduled => (
                "Appointment rescheduled",
                format!(
                    "Your appointment has been moved to {}. It is awaiting confirmation.",
                    when
                ),
            ),
            NotificationType::AppointmentCanceled => (
                "Appointment cancelled",
                format!("Your appointment on {} has been cancelled.", when),
            ),
        };

        let notification_data = json!({
            "user_id": user_id,
            "notification_type": kind.to_string(),
            "title": title,
            "message": message,
            "reference_id": appointment.id,
        });

        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/notifications",
                Some(auth_token),
                Some(notification_data),
                Some(headers),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::DatabaseError(
                "Notification insert returned no rows".to_string(),
            ));
        }

        debug!(
            "Stored {} notification for user {} (appointment {})",
            kind, user_id, appointment.id
        );
        Ok(())
    }
}
