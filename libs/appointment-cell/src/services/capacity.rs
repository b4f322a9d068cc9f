// libs/appointment-cell/src/services/capacity.rs
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use shared_database::Store;

use crate::models::{AppointmentError, EventCapacity};

/// Read-only view of how full an event day is. Never retries; transient
/// storage failures go back to the caller.
pub struct CapacityLedger {
    store: Arc<dyn Store>,
}

impl CapacityLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn count_active(&self, event_id: Uuid, date: NaiveDate) -> Result<i64, AppointmentError> {
        if self.store.get_event(event_id).await?.is_none() {
            return Err(AppointmentError::EventNotFound(event_id));
        }
        let count = self.store.count_active(event_id, date).await?;
        debug!("Event {} has {} active appointments on {}", event_id, count, date);
        Ok(count)
    }

    pub async fn capacity_of(&self, event_id: Uuid) -> Result<EventCapacity, AppointmentError> {
        let details = self
            .store
            .get_event(event_id)
            .await?
            .ok_or(AppointmentError::EventNotFound(event_id))?;

        Ok(EventCapacity {
            event_id,
            start_date: details.event.start_date,
            end_date: details.event.end_date,
            max_capacity: details.event.max_capacity,
        })
    }

    /// Seats left on `date`, zero when the day is outside the event range.
    pub async fn remaining(&self, event_id: Uuid, date: NaiveDate) -> Result<i64, AppointmentError> {
        let capacity = self.capacity_of(event_id).await?;
        if date < capacity.start_date || date > capacity.end_date {
            return Ok(0);
        }
        let used = self.store.count_active(event_id, date).await?;
        Ok((capacity.max_capacity as i64 - used).max(0))
    }
}
