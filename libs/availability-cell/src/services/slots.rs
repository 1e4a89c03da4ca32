use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Timelike, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::ScheduleError;
use crate::services::schedule::AvailabilityService;

/// Candidate starts are anchored at each free window's start and advance
/// in steps of this many minutes.
pub const SLOT_STEP_MINUTES: u32 = 15;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Appointment row projected down to its blocking interval.
#[derive(Debug, Clone, Deserialize)]
struct HoldInterval {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

/// Computes bookable start times for one dentist and date. All interval
/// arithmetic happens in whole minutes of the clinic's wall-clock day;
/// stored UTC instants are converted before subtraction.
pub struct SlotResolver {
    supabase: SupabaseClient,
    schedule: AvailabilityService,
    clinic_offset: FixedOffset,
}

impl SlotResolver {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            schedule: AvailabilityService::new(config),
            clinic_offset: config.clinic_utc_offset,
        }
    }

    /// Ordered, distinct "HH:MM" starts where the whole service duration
    /// fits inside open, unbooked time. No availability is an empty list,
    /// never an error.
    pub async fn get_available_slots(
        &self,
        dentist_id: Uuid,
        date: NaiveDate,
        duration_minutes: u32,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<String>, ScheduleError> {
        if duration_minutes == 0 {
            return Err(ScheduleError::ValidationError(
                "service_duration must be positive".to_string(),
            ));
        }

        let open = self
            .schedule
            .get_effective_intervals(dentist_id, date, auth_token)
            .await?;
        if open.is_empty() {
            debug!("No open intervals for dentist {} on {}", dentist_id, date);
            return Ok(vec![]);
        }

        let holds = self
            .fetch_holds(dentist_id, date, exclude_appointment_id, auth_token)
            .await?;

        let mut busy: Vec<(u32, u32)> = holds
            .iter()
            .filter_map(|hold| self.clamp_to_day(hold, date))
            .collect();
        busy.sort_unstable();

        let mut slots = Vec::new();
        for (open_start, open_end) in open {
            let window = (ceil_minute(open_start), floor_minute(open_end));
            if window.0 >= window.1 {
                continue;
            }
            for free in subtract_busy(window, &busy) {
                for start in candidate_starts(free, duration_minutes, SLOT_STEP_MINUTES) {
                    slots.push(format_minute(start));
                }
            }
        }

        slots.sort_unstable();
        slots.dedup();

        debug!(
            "Found {} slots for dentist {} on {}",
            slots.len(),
            dentist_id,
            date
        );
        Ok(slots)
    }

    /// Appointments holding the dentist's calendar on the given clinic-local
    /// day: status pending_approval, pending_reschedule, or confirmed.
    async fn fetch_holds(
        &self,
        dentist_id: Uuid,
        date: NaiveDate,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<HoldInterval>, ScheduleError> {
        let (day_start, day_end) = self.day_window_utc(date)?;

        let mut path = format!(
            "/rest/v1/appointments?select=start_time,end_time&dentist_id=eq.{}&status=in.(pending_approval,pending_reschedule,confirmed)&start_time=lt.{}&end_time=gt.{}&order=start_time.asc",
            dentist_id,
            urlencoding::encode(&day_end.to_rfc3339()),
            urlencoding::encode(&day_start.to_rfc3339()),
        );
        if let Some(exclude_id) = exclude_appointment_id {
            path.push_str(&format!("&id=neq.{}", exclude_id));
        }

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))
    }

    /// UTC instants bounding the clinic-local calendar day.
    fn day_window_utc(
        &self,
        date: NaiveDate,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), ScheduleError> {
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
            _ => Err(ScheduleError::ValidationError(format!(
                "date {} is not representable in the clinic timezone",
                date
            ))),
        }
    }

    /// Busy minutes of the clinic-local day covered by the hold, or None
    /// when the hold falls entirely outside it. Start floors and end
    /// ceils so a partial minute always widens the blocked range.
    fn clamp_to_day(&self, hold: &HoldInterval, date: NaiveDate) -> Option<(u32, u32)> {
        let start_local = hold.start_time.with_timezone(&self.clinic_offset);
        let end_local = hold.end_time.with_timezone(&self.clinic_offset);

        let start = if start_local.date_naive() < date {
            0
        } else if start_local.date_naive() > date {
            return None;
        } else {
            floor_minute(start_local.time())
        };

        let end = if end_local.date_naive() > date {
            MINUTES_PER_DAY
        } else if end_local.date_naive() < date {
            return None;
        } else {
            ceil_minute(end_local.time())
        };

        if start < end {
            Some((start, end))
        } else {
            None
        }
    }
}

fn floor_minute(t: NaiveTime) -> u32 {
    t.num_seconds_from_midnight() / 60
}

fn ceil_minute(t: NaiveTime) -> u32 {
    let seconds = t.num_seconds_from_midnight();
    seconds / 60 + u32::from(seconds % 60 != 0)
}

fn format_minute(minute: u32) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

/// Free sub-intervals of `open` once the busy intervals are removed.
/// `busy` must be sorted by start; intervals may overlap each other.
fn subtract_busy(open: (u32, u32), busy: &[(u32, u32)]) -> Vec<(u32, u32)> {
    let (mut cursor, end) = open;
    let mut free = Vec::new();

    for &(busy_start, busy_end) in busy {
        if busy_end <= cursor || busy_start >= end {
            continue;
        }
        if busy_start > cursor {
            free.push((cursor, busy_start));
        }
        cursor = cursor.max(busy_end);
        if cursor >= end {
            return free;
        }
    }

    if cursor < end {
        free.push((cursor, end));
    }
    free
}

/// Start minutes inside `free` where a booking of `duration` still fits,
/// stepping from the window start. A window shorter than the duration
/// yields nothing.
fn candidate_starts(free: (u32, u32), duration: u32, step: u32) -> Vec<u32> {
    let (start, end) = free;
    if end < start + duration {
        return vec![];
    }
    (start..=end - duration).step_by(step as usize).collect()
}
