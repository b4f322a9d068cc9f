// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use shared_models::AppointmentStatus;

use crate::models::AppointmentError;

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

    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Scheduled => vec![AppointmentStatus::Cancelled, AppointmentStatus::Completed],
            // Re-activation takes a seat again, so callers must re-check capacity.
            AppointmentStatus::Cancelled => vec![AppointmentStatus::Scheduled],
            AppointmentStatus::Completed => vec![],
        }
    }

    /// True when the move takes a seat that was not held before.
    pub fn reclaims_seat(&self, current_status: AppointmentStatus, new_status: AppointmentStatus) -> bool {
        !current_status.is_active() && new_status.is_active()
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}
