use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One recurring window of a dentist's weekly template.
/// `day_of_week` runs 0 = Sunday through 6 = Saturday.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityRule {
    pub id: Uuid,
    pub dentist_id: Uuid,
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// Date-specific exception. Supersedes the weekly template for its date:
/// either a single replacement window or a full blackout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityOverride {
    pub id: Uuid,
    pub dentist_id: Uuid,
    pub override_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub is_unavailable: bool,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ReplaceAvailabilityRequest {
    #[serde(default)]
    pub weekly: Vec<WeeklyRulePayload>,
    #[serde(default)]
    pub overrides: Vec<OverridePayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyRulePayload {
    #[serde(alias = "day_of_week")]
    pub day_of_the_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverridePayload {
    pub override_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub is_unavailable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DentistSchedule {
    pub dentist_id: Uuid,
    pub weekly: Vec<AvailabilityRule>,
    pub overrides: Vec<AvailabilityOverride>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum ScheduleError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Dentist not found")]
    DentistNotFound,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
