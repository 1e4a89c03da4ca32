// libs/appointment-cell/src/handlers.rs
use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    Appointment, AppointmentError, AppointmentSearchFilters, AppointmentStatus,
    ReserveAppointmentRequest, UpdateAppointmentRequest,
};
use crate::router::AppointmentState;
use crate::services::booking::BookingService;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchQueryParams {
    pub patient_id: Option<Uuid>,
    pub dentist_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

/// Book an appointment. The caller is the patient; the dentist is assigned
/// server-side to the first free qualified one.
#[axum::debug_handler]
pub async fn reserve_appointment(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<ReserveAppointmentRequest>,
) -> Result<(StatusCode, Json<Appointment>), AppError> {
    if !user.has_role("patient") {
        return Err(AppError::Forbidden(
            "Only patients can reserve appointments".to_string(),
        ));
    }
    let patient_id = parse_user_id(&user)?;

    let service = BookingService::new(&state.config, state.guard.clone());
    let appointment = service
        .reserve(patient_id, request, auth.token())
        .await
        .map_err(appointment_error)?;

    Ok((StatusCode::CREATED, Json(appointment)))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Appointment>, AppError> {
    let service = BookingService::new(&state.config, state.guard.clone());
    let appointment = service
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(appointment_error)?;

    let is_owner = appointment.patient_id.to_string() == user.id;
    let is_assigned_dentist = appointment.dentist_id.to_string() == user.id;
    if !user.is_staff() && !is_owner && !is_assigned_dentist {
        return Err(AppError::Forbidden(
            "Not authorized to view this appointment".to_string(),
        ));
    }

    Ok(Json(appointment))
}

/// Search appointments. Staff and admin see everything; a patient only their
/// own appointments, a dentist only their own calendar.
#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(params): Query<SearchQueryParams>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    let mut filters = AppointmentSearchFilters {
        patient_id: params.patient_id,
        dentist_id: params.dentist_id,
        status: params.status,
        date_from: params.date_from,
        date_to: params.date_to,
    };

    if !user.is_staff() {
        let own_id = parse_user_id(&user)?;
        if user.has_role("patient") {
            if filters.patient_id.is_some_and(|id| id != own_id) {
                return Err(AppError::Forbidden(
                    "Patients can only search their own appointments".to_string(),
                ));
            }
            filters.patient_id = Some(own_id);
        } else if user.has_role("dentist") {
            if filters.dentist_id.is_some_and(|id| id != own_id) {
                return Err(AppError::Forbidden(
                    "Dentists can only search their own calendar".to_string(),
                ));
            }
            filters.dentist_id = Some(own_id);
        } else {
            return Err(AppError::Forbidden(
                "Not authorized to search appointments".to_string(),
            ));
        }
    }

    let service = BookingService::new(&state.config, state.guard.clone());
    let appointments = service
        .search_appointments(filters, auth.token())
        .await
        .map_err(appointment_error)?;

    Ok(Json(appointments))
}

/// Change an appointment's time or status. Staff and admin may apply any
/// event; a dentist only on their own calendar; a patient may reschedule or
/// cancel their own appointment, nothing else.
#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Appointment>, AppError> {
    let service = BookingService::new(&state.config, state.guard.clone());
    let current = service
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(appointment_error)?;

    authorize_update(&user, &current, &request)?;

    let updated = service
        .update_appointment(appointment_id, request, auth.token())
        .await
        .map_err(appointment_error)?;

    Ok(Json(updated))
}

fn authorize_update(
    user: &User,
    appointment: &Appointment,
    request: &UpdateAppointmentRequest,
) -> Result<(), AppError> {
    if user.is_staff() {
        return Ok(());
    }

    if user.has_role("dentist") {
        if appointment.dentist_id.to_string() == user.id {
            return Ok(());
        }
        return Err(AppError::Forbidden(
            "Dentists can only manage their own calendar".to_string(),
        ));
    }

    if user.has_role("patient") {
        if appointment.patient_id.to_string() != user.id {
            return Err(AppError::Forbidden(
                "Patients can only modify their own appointments".to_string(),
            ));
        }
        if let Some(status) = request.status {
            if !matches!(
                status,
                AppointmentStatus::Cancelled | AppointmentStatus::PendingReschedule
            ) {
                return Err(AppError::Forbidden(
                    "Patients can only cancel or reschedule".to_string(),
                ));
            }
        }
        return Ok(());
    }

    Err(AppError::Forbidden(
        "Not authorized to modify appointments".to_string(),
    ))
}

fn parse_user_id(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Token subject is not a valid id".to_string()))
}

fn appointment_error(err: AppointmentError) -> AppError {
    match err {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::ServiceNotFound => AppError::NotFound("Service not found".to_string()),
        AppointmentError::NoDentistAvailable => {
            AppError::Conflict("no dentist available".to_string())
        }
        AppointmentError::ConflictDetected => AppError::Conflict(err.to_string()),
        AppointmentError::InvalidStatusTransition(_) => AppError::Conflict(err.to_string()),
        AppointmentError::InvalidTime(msg) => AppError::ValidationError(msg),
        AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
        AppointmentError::DatabaseError(msg) => AppError::Database(msg),
    }
}
