// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, info, warn};

use crate::models::{AppointmentError, AppointmentStatus, NotificationType};

/// The appointment state machine. Everything an appointment may do after
/// creation goes through `validate_status_transition`; pairs outside the
/// table fail and leave the row untouched.
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_status_transition(
        &self,
        current_status: &AppointmentStatus,
        new_status: &AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!(
            "Validating status transition from {} to {}",
            current_status, new_status
        );

        let valid_transitions = self.valid_transitions(current_status);

        if !valid_transitions.contains(new_status) {
            warn!(
                "Invalid status transition attempted: {} -> {}",
                current_status, new_status
            );
            return Err(AppointmentError::InvalidStatusTransition(*current_status));
        }

        info!("Status transition validated: {} -> {}", current_status, new_status);
        Ok(())
    }

    /// All valid next statuses for a given current status.
    pub fn valid_transitions(&self, current_status: &AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::PendingApproval => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::PendingReschedule,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::PendingReschedule,
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::PendingReschedule => vec![AppointmentStatus::Cancelled],
            // Terminal states
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::Cancelled => vec![],
            AppointmentStatus::NoShow => vec![],
        }
    }

    /// The notification the patient receives when an appointment lands in
    /// `status`, if any. Completion and no-show are silent.
    pub fn notification_for(&self, status: &AppointmentStatus) -> Option<NotificationType> {
        match status {
            AppointmentStatus::Confirmed => Some(NotificationType::AppointmentConfirmed),
            AppointmentStatus::PendingReschedule => Some(NotificationType::AppointmentRescheduled),
            AppointmentStatus::Cancelled => Some(NotificationType::AppointmentCanceled),
            _ => None,
        }
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}
