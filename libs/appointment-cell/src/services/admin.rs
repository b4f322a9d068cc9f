// libs/appointment-cell/src/services/admin.rs
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_database::{BookingTx, Store};
use shared_models::{Appointment, AppointmentStatus};

use crate::models::AppointmentError;
use crate::services::lifecycle::AppointmentLifecycleService;

/// Operations behind the administrative surface: listing, status changes
/// and deletion. No denormalized counters are kept, so deleting a row is
/// all it takes to free its seat.
pub struct AppointmentAdminService {
    store: Arc<dyn Store>,
    lifecycle: AppointmentLifecycleService,
}

impl AppointmentAdminService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            lifecycle: AppointmentLifecycleService::new(),
        }
    }

    pub async fn list_by_event(&self, event_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        if self.store.get_event(event_id).await?.is_none() {
            return Err(AppointmentError::EventNotFound(event_id));
        }
        let appointments = self.store.list_appointments_by_event(event_id).await?;
        debug!("Event {} has {} appointments", event_id, appointments.len());
        Ok(appointments)
    }

    /// Changes the status under the event lock. Moving a cancelled booking
    /// back to scheduled re-runs the capacity and duplicate checks.
    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        let current = self
            .store
            .get_appointment(appointment_id)
            .await?
            .ok_or(AppointmentError::AppointmentNotFound(appointment_id))?;

        if current.status == new_status {
            return Ok(current);
        }

        let mut tx = self.store.begin().await?;
        let outcome = self
            .update_in_transaction(tx.as_mut(), current.event_id, appointment_id, new_status)
            .await;

        match outcome {
            Ok(updated) => {
                tx.commit().await?;
                info!("Appointment {} moved to {}", appointment_id, new_status);
                Ok(updated)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("Rollback after failed status update also failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    async fn update_in_transaction(
        &self,
        tx: &mut dyn BookingTx,
        event_id: Uuid,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        let details = tx
            .lock_event(event_id)
            .await?
            .ok_or(AppointmentError::EventNotFound(event_id))?;

        // Re-read under the lock; the row may have changed since the first look.
        let current = tx
            .get_appointment(appointment_id)
            .await?
            .ok_or(AppointmentError::AppointmentNotFound(appointment_id))?;

        self.lifecycle.validate_status_transition(current.status, new_status)?;

        if self.lifecycle.reclaims_seat(current.status, new_status) {
            let date = current.appointment_date;
            if tx
                .find_active_booking(current.patient_id, current.event_id, date)
                .await?
                .is_some()
            {
                return Err(AppointmentError::AlreadyBooked { date });
            }
            let active = tx.count_active(current.event_id, date).await?;
            if active >= details.event.max_capacity as i64 {
                return Err(AppointmentError::EventFull { date });
            }
        }

        tx.set_appointment_status(appointment_id, new_status)
            .await?
            .ok_or(AppointmentError::AppointmentNotFound(appointment_id))
    }

    pub async fn delete(&self, appointment_id: Uuid) -> Result<(), AppointmentError> {
        if !self.store.delete_appointment(appointment_id).await? {
            return Err(AppointmentError::AppointmentNotFound(appointment_id));
        }
        info!("Appointment {} deleted", appointment_id);
        Ok(())
    }
}
