// libs/appointment-cell/src/services/booking.rs
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentError, AppointmentSearchFilters, AppointmentStatus, Dentist,
    ReserveAppointmentRequest, Service, UpdateAppointmentRequest,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::guard::CalendarGuard;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::notify::NotificationService;

/// Books appointments and drives their lifecycle. Every write that depends
/// on a conflict check runs under the dentist's CalendarGuard lock.
pub struct BookingService {
    supabase: SupabaseClient,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    notification_service: NotificationService,
    guard: CalendarGuard,
    clinic_offset: FixedOffset,
}

impl BookingService {
    pub fn new(config: &AppConfig, guard: CalendarGuard) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            conflict_service: ConflictDetectionService::new(config),
            lifecycle_service: AppointmentLifecycleService::new(),
            notification_service: NotificationService::new(config),
            guard,
            clinic_offset: config.clinic_utc_offset,
        }
    }

    /// Reserve an appointment for the patient. Scans dentists qualified for
    /// the service in ascending id order and commits on the first one whose
    /// calendar is free; the appointment starts in pending_approval.
    pub async fn reserve(
        &self,
        patient_id: Uuid,
        request: ReserveAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let service = self.get_service(request.service_id, auth_token).await?;
        let (start_time, end_time) = self.booking_interval(
            request.appointment_date,
            request.appointment_time,
            service.estimated_duration_minutes,
        )?;

        debug!(
            "Reserving {} for patient {} at {} ({} minutes)",
            service.name, patient_id, start_time, service.estimated_duration_minutes
        );

        let dentists = self
            .get_qualified_dentists(&service.required_role, auth_token)
            .await?;
        if dentists.is_empty() {
            warn!("No active dentists with role {}", service.required_role);
            return Err(AppointmentError::NoDentistAvailable);
        }

        for dentist in dentists {
            let lock = self.guard.lock_for(dentist.id).await;
            let _guard = lock.lock().await;

            let conflicts = self
                .conflict_service
                .find_conflicts(dentist.id, start_time, end_time, None, auth_token)
                .await?;
            if !conflicts.is_empty() {
                debug!("Dentist {} is booked, trying next", dentist.id);
                continue;
            }

            let appointment = self
                .insert_appointment(
                    patient_id,
                    dentist.id,
                    request.service_id,
                    start_time,
                    end_time,
                    auth_token,
                )
                .await?;

            info!(
                "Appointment {} reserved with dentist {} at {}",
                appointment.id, dentist.id, start_time
            );
            return Ok(appointment);
        }

        warn!(
            "No dentist free for {} to {}, reservation rejected",
            start_time, end_time
        );
        Err(AppointmentError::NoDentistAvailable)
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}&limit=1", appointment_id);
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = rows.first().ok_or(AppointmentError::NotFound)?;
        serde_json::from_value(row.clone())
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    pub async fn search_appointments(
        &self,
        filters: AppointmentSearchFilters,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut query_parts = Vec::new();

        if let Some(patient_id) = filters.patient_id {
            query_parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(dentist_id) = filters.dentist_id {
            query_parts.push(format!("dentist_id=eq.{}", dentist_id));
        }
        if let Some(status) = filters.status {
            query_parts.push(format!("status=eq.{}", status));
        }
        if let Some(date_from) = filters.date_from {
            let (from, _) = self.day_window_utc(date_from)?;
            query_parts.push(format!(
                "start_time=gte.{}",
                urlencoding::encode(&from.to_rfc3339())
            ));
        }
        if let Some(date_to) = filters.date_to {
            let (_, until) = self.day_window_utc(date_to)?;
            query_parts.push(format!(
                "start_time=lt.{}",
                urlencoding::encode(&until.to_rfc3339())
            ));
        }
        query_parts.push("order=start_time.asc".to_string());

        let path = format!("/rest/v1/appointments?{}", query_parts.join("&"));
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    /// Apply a PATCH to an appointment. A request carrying time fields is a
    /// reschedule and lands in pending_reschedule; a bare status change is
    /// validated against the transition table. Either way the stored row is
    /// only touched after validation passes.
    pub async fn update_appointment(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get_appointment(appointment_id, auth_token).await?;

        if request.is_time_change() {
            return self.reschedule(&current, request, auth_token).await;
        }

        let new_status = request.status.ok_or_else(|| {
            AppointmentError::ValidationError(
                "Request must carry start_time, end_time, or status".to_string(),
            )
        })?;

        if new_status == AppointmentStatus::PendingReschedule {
            return Err(AppointmentError::ValidationError(
                "A reschedule must carry the new start_time".to_string(),
            ));
        }

        self.lifecycle_service
            .validate_status_transition(&current.status, &new_status)?;

        let updated = self
            .patch_appointment_row(
                appointment_id,
                json!({
                    "status": new_status.to_string(),
                    "updated_at": Utc::now().to_rfc3339(),
                }),
                auth_token,
            )
            .await?;

        self.notify_for_status(&updated, auth_token).await;
        Ok(updated)
    }

    async fn reschedule(
        &self,
        current: &Appointment,
        request: UpdateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        // An explicit status on a time change must agree with the reschedule.
        if let Some(status) = request.status {
            if status != AppointmentStatus::PendingReschedule {
                return Err(AppointmentError::ValidationError(format!(
                    "A time change moves the appointment to pending_reschedule, not {}",
                    status
                )));
            }
        }

        let new_start = request.start_time.unwrap_or(current.start_time);
        let new_end = match request.end_time {
            Some(end) => end,
            None => new_start + (current.end_time - current.start_time),
        };
        if new_start >= new_end {
            return Err(AppointmentError::InvalidTime(
                "start_time must be before end_time".to_string(),
            ));
        }

        self.lifecycle_service
            .validate_status_transition(&current.status, &AppointmentStatus::PendingReschedule)?;

        let lock = self.guard.lock_for(current.dentist_id).await;
        let _guard = lock.lock().await;

        let conflicts = self
            .conflict_service
            .find_conflicts(
                current.dentist_id,
                new_start,
                new_end,
                Some(current.id),
                auth_token,
            )
            .await?;
        if !conflicts.is_empty() {
            return Err(AppointmentError::ConflictDetected);
        }

        let updated = self
            .patch_appointment_row(
                current.id,
                json!({
                    "start_time": new_start.to_rfc3339(),
                    "end_time": new_end.to_rfc3339(),
                    "status": AppointmentStatus::PendingReschedule.to_string(),
                    "updated_at": Utc::now().to_rfc3339(),
                }),
                auth_token,
            )
            .await?;

        info!(
            "Appointment {} rescheduled to {} - {}",
            updated.id, new_start, new_end
        );
        self.notify_for_status(&updated, auth_token).await;
        Ok(updated)
    }

    async fn notify_for_status(&self, appointment: &Appointment, auth_token: &str) {
        if let Some(kind) = self.lifecycle_service.notification_for(&appointment.status) {
            self.notification_service
                .dispatch(appointment.patient_id, kind, appointment, auth_token)
                .await;
        }
    }

    async fn get_service(
        &self,
        service_id: Uuid,
        auth_token: &str,
    ) -> Result<Service, AppointmentError> {
        let path = format!("/rest/v1/services?id=eq.{}&limit=1", service_id);
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = rows.first().ok_or(AppointmentError::ServiceNotFound)?;
        let service: Service = serde_json::from_value(row.clone())
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if service.estimated_duration_minutes <= 0 {
            return Err(AppointmentError::ValidationError(format!(
                "Service {} has no usable duration",
                service.id
            )));
        }
        Ok(service)
    }

    /// Active dentists qualified for the service's role, ascending by id.
    /// The order is the assignment policy: first free dentist wins.
    async fn get_qualified_dentists(
        &self,
        required_role: &str,
        auth_token: &str,
    ) -> Result<Vec<Dentist>, AppointmentError> {
        let path = format!(
            "/rest/v1/dentists?role=eq.{}&is_active=eq.true&order=id.asc",
            required_role
        );
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    async fn insert_appointment(
        &self,
        patient_id: Uuid,
        dentist_id: Uuid,
        service_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment_data = json!({
            "patient_id": patient_id,
            "dentist_id": dentist_id,
            "service_id": service_id,
            "start_time": start_time.to_rfc3339(),
            "end_time": end_time.to_rfc3339(),
            "status": AppointmentStatus::PendingApproval.to_string(),
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339(),
        });

        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(appointment_data),
                Some(headers),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::DatabaseError(
                "Appointment insert returned no rows".to_string(),
            ));
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    async fn patch_appointment_row(
        &self,
        appointment_id: Uuid,
        update_data: Value,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(update_data),
                Some(headers),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = result.first().ok_or(AppointmentError::NotFound)?;
        serde_json::from_value(row.clone())
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    /// Clinic wall-clock date and time to the UTC booking interval.
    fn booking_interval(
        &self,
        date: NaiveDate,
        time: NaiveTime,
        duration_minutes: i32,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), AppointmentError> {
        let start_time = date
            .and_time(time)
            .and_local_timezone(self.clinic_offset)
            .single()
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| {
                AppointmentError::InvalidTime(format!(
                    "{} {} is not representable in the clinic timezone",
                    date, time
                ))
            })?;
        let end_time = start_time + Duration::minutes(duration_minutes as i64);
        Ok((start_time, end_time))
    }

    /// UTC instants bounding one clinic-local calendar day.
    fn day_window_utc(
        &self,
        date: NaiveDate,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), AppointmentError> {
        let to_utc = |naive: chrono::NaiveDateTime| {
            naive
                .and_local_timezone(self.clinic_offset)
                .single()
                .map(|local| local.with_timezone(&Utc))
        };

        let start = to_utc(date.and_time(NaiveTime::MIN));
        let end = to_utc((date + Duration::days(1)).and_time(NaiveTime::MIN));

        match (start, end) {
            (Some(start), Some(end)) => Ok((start, end)),
            _ => Err(AppointmentError::InvalidTime(format!(
                "date {} is not representable in the clinic timezone",
                date
            ))),
        }
    }
}
