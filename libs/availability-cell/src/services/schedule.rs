use chrono::{Datelike, NaiveDate, NaiveTime};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    AvailabilityOverride, AvailabilityRule, DentistSchedule, OverridePayload,
    ReplaceAvailabilityRequest, ScheduleError, WeeklyRulePayload,
};

/// Store for weekly templates and date overrides. Writes are wholesale
/// replaces: saving a template drops everything the dentist had before.
pub struct AvailabilityService {
    supabase: SupabaseClient,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Replace the dentist's entire weekly template and override set in one
    /// database transaction. Readers never observe the half-replaced state.
    pub async fn replace_availability(
        &self,
        dentist_id: Uuid,
        request: ReplaceAvailabilityRequest,
        auth_token: &str,
    ) -> Result<Value, ScheduleError> {
        debug!(
            "Replacing availability for dentist {}: {} weekly rules, {} overrides",
            dentist_id,
            request.weekly.len(),
            request.overrides.len()
        );

        validate_weekly_rules(&request.weekly)?;
        validate_overrides(&request.overrides)?;

        let payload = json!({
            "p_dentist_id": dentist_id,
            "p_weekly": request.weekly,
            "p_overrides": request.overrides,
        });

        let summary: Value = self
            .supabase
            .request(
                Method::POST,
                "/rest/v1/rpc/replace_dentist_availability",
                Some(auth_token),
                Some(payload),
            )
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        Ok(summary)
    }

    /// The stored template and overrides, for the schedule-editing round trip.
    pub async fn get_schedule(
        &self,
        dentist_id: Uuid,
        auth_token: &str,
    ) -> Result<DentistSchedule, ScheduleError> {
        debug!("Fetching schedule for dentist {}", dentist_id);

        let rules_path = format!(
            "/rest/v1/availability_rules?dentist_id=eq.{}&order=day_of_week.asc,start_time.asc",
            dentist_id
        );
        let rules: Vec<Value> = self
            .supabase
            .request(Method::GET, &rules_path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let overrides_path = format!(
            "/rest/v1/availability_overrides?dentist_id=eq.{}&order=override_date.asc",
            dentist_id
        );
        let overrides: Vec<Value> = self
            .supabase
            .request(Method::GET, &overrides_path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let weekly: Vec<AvailabilityRule> = rules
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let overrides: Vec<AvailabilityOverride> = overrides
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        Ok(DentistSchedule {
            dentist_id,
            weekly,
            overrides,
        })
    }

    /// Open intervals for one calendar date. An override fully supersedes
    /// the weekly template for its date.
    pub async fn get_effective_intervals(
        &self,
        dentist_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<(NaiveTime, NaiveTime)>, ScheduleError> {
        let override_path = format!(
            "/rest/v1/availability_overrides?dentist_id=eq.{}&override_date=eq.{}&limit=1",
            dentist_id, date
        );
        let overrides: Vec<Value> = self
            .supabase
            .request(Method::GET, &override_path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        if let Some(row) = overrides.first() {
            let entry: AvailabilityOverride = serde_json::from_value(row.clone())
                .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

            if entry.is_unavailable {
                debug!("Dentist {} is blacked out on {}", dentist_id, date);
                return Ok(vec![]);
            }

            return Ok(match (entry.start_time, entry.end_time) {
                (Some(start), Some(end)) if start < end => vec![(start, end)],
                _ => vec![],
            });
        }

        let day_of_week = date.weekday().num_days_from_sunday() as i32;
        let rules_path = format!(
            "/rest/v1/availability_rules?dentist_id=eq.{}&day_of_week=eq.{}&order=start_time.asc",
            dentist_id, day_of_week
        );
        let rules: Vec<Value> = self
            .supabase
            .request(Method::GET, &rules_path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let rules: Vec<AvailabilityRule> = rules
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        Ok(rules
            .into_iter()
            .filter(|rule| rule.start_time < rule.end_time)
            .map(|rule| (rule.start_time, rule.end_time))
            .collect())
    }
}

/// Rejects templates with a bad day index, an inverted window, or two
/// windows on the same day that overlap. Back-to-back windows are fine.
pub fn validate_weekly_rules(rules: &[WeeklyRulePayload]) -> Result<(), ScheduleError> {
    for rule in rules {
        if rule.day_of_the_week < 0 || rule.day_of_the_week > 6 {
            return Err(ScheduleError::ValidationError(format!(
                "day_of_the_week must be between 0 (Sunday) and 6 (Saturday), got {}",
                rule.day_of_the_week
            )));
        }
        if rule.start_time >= rule.end_time {
            return Err(ScheduleError::ValidationError(format!(
                "start_time {} must be before end_time {}",
                rule.start_time, rule.end_time
            )));
        }
    }

    for (i, a) in rules.iter().enumerate() {
        for b in rules.iter().skip(i + 1) {
            if a.day_of_the_week != b.day_of_the_week {
                continue;
            }
            if a.start_time < b.end_time && b.start_time < a.end_time {
                return Err(ScheduleError::ValidationError(format!(
                    "overlapping windows on day {}: {}-{} and {}-{}",
                    a.day_of_the_week, a.start_time, a.end_time, b.start_time, b.end_time
                )));
            }
        }
    }

    Ok(())
}

/// Rejects duplicate dates and available overrides with missing or
/// inverted windows. A blackout override carries no times.
pub fn validate_overrides(overrides: &[OverridePayload]) -> Result<(), ScheduleError> {
    for entry in overrides {
        if entry.is_unavailable {
            continue;
        }
        match (entry.start_time, entry.end_time) {
            (Some(start), Some(end)) => {
                if start >= end {
                    return Err(ScheduleError::ValidationError(format!(
                        "override for {}: start_time {} must be before end_time {}",
                        entry.override_date, start, end
                    )));
                }
            }
            _ => {
                return Err(ScheduleError::ValidationError(format!(
                    "override for {} must carry start_time and end_time unless marked unavailable",
                    entry.override_date
                )));
            }
        }
    }

    for (i, a) in overrides.iter().enumerate() {
        for b in overrides.iter().skip(i + 1) {
            if a.override_date == b.override_date {
                return Err(ScheduleError::ValidationError(format!(
                    "duplicate override for {}",
                    a.override_date
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn rule(day: i32, start: NaiveTime, end: NaiveTime) -> WeeklyRulePayload {
        WeeklyRulePayload {
            day_of_the_week: day,
            start_time: start,
            end_time: end,
        }
    }

    #[test]
    fn test_valid_split_shift_passes() {
        let rules = vec![
            rule(1, time(9, 0), time(12, 0)),
            rule(1, time(13, 0), time(17, 0)),
        ];
        assert!(validate_weekly_rules(&rules).is_ok());
    }

    #[test]
    fn test_back_to_back_windows_pass() {
        let rules = vec![
            rule(2, time(9, 0), time(12, 0)),
            rule(2, time(12, 0), time(15, 0)),
        ];
        assert!(validate_weekly_rules(&rules).is_ok());
    }

    #[test]
    fn test_same_day_overlap_rejected() {
        let rules = vec![
            rule(1, time(9, 0), time(12, 0)),
            rule(1, time(11, 0), time(14, 0)),
        ];
        assert_matches!(
            validate_weekly_rules(&rules),
            Err(ScheduleError::ValidationError(_))
        );
    }

    #[test]
    fn test_overlap_on_different_days_allowed() {
        let rules = vec![
            rule(1, time(9, 0), time(12, 0)),
            rule(2, time(9, 0), time(12, 0)),
        ];
        assert!(validate_weekly_rules(&rules).is_ok());
    }

    #[test]
    fn test_inverted_window_rejected() {
        let rules = vec![rule(3, time(14, 0), time(9, 0))];
        assert_matches!(
            validate_weekly_rules(&rules),
            Err(ScheduleError::ValidationError(_))
        );
    }

    #[test]
    fn test_day_out_of_range_rejected() {
        let rules = vec![rule(7, time(9, 0), time(12, 0))];
        assert_matches!(
            validate_weekly_rules(&rules),
            Err(ScheduleError::ValidationError(_))
        );
    }

    #[test]
    fn test_blackout_override_needs_no_times() {
        let overrides = vec![OverridePayload {
            override_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            start_time: None,
            end_time: None,
            is_unavailable: true,
        }];
        assert!(validate_overrides(&overrides).is_ok());
    }

    #[test]
    fn test_available_override_requires_times() {
        let overrides = vec![OverridePayload {
            override_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            start_time: Some(time(9, 0)),
            end_time: None,
            is_unavailable: false,
        }];
        assert_matches!(
            validate_overrides(&overrides),
            Err(ScheduleError::ValidationError(_))
        );
    }

    #[test]
    fn test_duplicate_override_dates_rejected() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let overrides = vec![
            OverridePayload {
                override_date: date,
                start_time: Some(time(9, 0)),
                end_time: Some(time(12, 0)),
                is_unavailable: false,
            },
            OverridePayload {
                override_date: date,
                start_time: None,
                end_time: None,
                is_unavailable: true,
            },
        ];
        assert_matches!(
            validate_overrides(&overrides),
            Err(ScheduleError::ValidationError(_))
        );
    }
}
