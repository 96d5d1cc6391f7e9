// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus, CreateAppointmentRequest};

/// Slack for bookings stamped a moment before the request arrives.
const PAST_BOOKING_GRACE_MINUTES: i64 = 5;

pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }

        Ok(())
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::InProgress,
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::InProgress => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            // Terminal states
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::Cancelled => vec![],
        }
    }

    /// Whether moving to `next` hands held reagent back to the lots.
    pub fn releases_reservations(&self, next: AppointmentStatus) -> bool {
        next.is_terminal()
    }

    pub fn validate_booking(
        &self,
        request: &CreateAppointmentRequest,
        current_time: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        if request.patient_name.trim().is_empty() {
            return Err(AppointmentError::ValidationError("Patient name is required".to_string()));
        }

        if request.scheduled_date < current_time - Duration::minutes(PAST_BOOKING_GRACE_MINUTES) {
            return Err(AppointmentError::InvalidTime(
                "Appointment cannot be scheduled in the past".to_string()
            ));
        }

        Ok(())
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use uuid::Uuid;

    fn request(scheduled_date: DateTime<Utc>) -> CreateAppointmentRequest {
        CreateAppointmentRequest {
            exam_type_id: Uuid::new_v4(),
            unit_id: Uuid::new_v4(),
            patient_name: "Maria Souza".to_string(),
            scheduled_date,
            notes: None,
        }
    }

    #[test]
    fn scheduled_can_start_complete_or_cancel() {
        let lifecycle = AppointmentLifecycleService::new();
        for next in [AppointmentStatus::InProgress, AppointmentStatus::Completed, AppointmentStatus::Cancelled] {
            assert!(lifecycle.validate_status_transition(AppointmentStatus::Scheduled, next).is_ok());
        }
    }

    #[test]
    fn in_progress_cannot_go_back() {
        let lifecycle = AppointmentLifecycleService::new();
        assert_matches!(
            lifecycle.validate_status_transition(AppointmentStatus::InProgress, AppointmentStatus::Scheduled),
            Err(AppointmentError::InvalidStatusTransition { .. })
        );
    }

    #[test]
    fn terminal_states_reject_everything() {
        let lifecycle = AppointmentLifecycleService::new();
        for current in [AppointmentStatus::Completed, AppointmentStatus::Cancelled] {
            assert!(lifecycle.get_valid_transitions(current).is_empty());
            assert_matches!(
                lifecycle.validate_status_transition(current, AppointmentStatus::InProgress),
                Err(AppointmentError::InvalidStatusTransition { from, .. }) if from == current
            );
        }
    }

    #[test]
    fn only_terminal_moves_release_reservations() {
        let lifecycle = AppointmentLifecycleService::new();
        assert!(lifecycle.releases_reservations(AppointmentStatus::Cancelled));
        assert!(lifecycle.releases_reservations(AppointmentStatus::Completed));
        assert!(!lifecycle.releases_reservations(AppointmentStatus::InProgress));
    }

    #[test]
    fn booking_in_the_past_is_rejected() {
        let lifecycle = AppointmentLifecycleService::new();
        let now = Utc::now();

        assert_matches!(
            lifecycle.validate_booking(&request(now - Duration::days(1)), now),
            Err(AppointmentError::InvalidTime(_))
        );
        assert!(lifecycle.validate_booking(&request(now + Duration::hours(2)), now).is_ok());
    }

    #[test]
    fn booking_needs_a_patient() {
        let lifecycle = AppointmentLifecycleService::new();
        let now = Utc::now();
        let mut blank = request(now + Duration::hours(1));
        blank.patient_name = "  ".to_string();

        assert_matches!(lifecycle.validate_booking(&blank, now), Err(AppointmentError::ValidationError(_)));
    }
}
