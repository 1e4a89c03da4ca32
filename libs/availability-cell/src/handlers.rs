use std::sync::Arc;

use axum::{
    extract::{Extension, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{ReplaceAvailabilityRequest, ScheduleError};
use crate::services::{AvailabilityService, SlotResolver};

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    #[serde(alias = "clinicianId", alias = "dentistId", alias = "dentist_id")]
    pub clinician_id: Uuid,
    pub date: NaiveDate,
    #[serde(alias = "serviceDuration")]
    pub service_duration: u32,
    #[serde(default, alias = "excludeAppointmentId")]
    pub exclude_appointment_id: Option<Uuid>,
}

/// Replace the caller's weekly template and overrides in one shot.
#[axum::debug_handler]
pub async fn replace_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<ReplaceAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.has_role("dentist") {
        return Err(AppError::Forbidden(
            "Only dentists can manage availability".to_string(),
        ));
    }
    let dentist_id = parse_user_id(&user)?;

    let service = AvailabilityService::new(&state);
    let summary = service
        .replace_availability(dentist_id, request, auth.token())
        .await
        .map_err(schedule_error)?;

    Ok(Json(summary))
}

/// The caller's stored template and overrides, for the editing UI.
#[axum::debug_handler]
pub async fn get_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.has_role("dentist") {
        return Err(AppError::Forbidden(
            "Only dentists can manage availability".to_string(),
        ));
    }
    let dentist_id = parse_user_id(&user)?;

    let service = AvailabilityService::new(&state);
    let schedule = service
        .get_schedule(dentist_id, auth.token())
        .await
        .map_err(schedule_error)?;

    Ok(Json(json!(schedule)))
}

/// Bookable "HH:MM" starts for a dentist, date, and service duration.
#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<Vec<String>>, AppError> {
    let resolver = SlotResolver::new(&state);
    let slots = resolver
        .get_available_slots(
            query.clinician_id,
            query.date,
            query.service_duration,
            query.exclude_appointment_id,
            auth.token(),
        )
        .await
        .map_err(schedule_error)?;

    Ok(Json(slots))
}

fn parse_user_id(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Token subject is not a valid id".to_string()))
}

fn schedule_error(err: ScheduleError) -> AppError {
    match err {
        ScheduleError::ValidationError(msg) => AppError::ValidationError(msg),
        ScheduleError::DentistNotFound => AppError::NotFound("Dentist not found".to_string()),
        ScheduleError::DatabaseError(msg) => AppError::Database(msg),
    }
}
