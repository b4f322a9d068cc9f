use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use shared_models::{
    Appointment, AppointmentStatus, City, ConversationLogEntry, ConversationSession, Direction,
    ErrorKind, Event, EventDetails, NewAppointment, NewEvent, NewPatient, Patient,
    ReminderCandidate, SessionStatus,
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Row decode error: {0}")]
    Decode(String),

    #[error("Migration error: {0}")]
    Migration(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidRecord(_) => ErrorKind::InvalidInput,
            _ => ErrorKind::StorageFailure,
        }
    }
}

/// Result of an insert that may lose a race against a concurrent writer
/// holding the same unique key. Callers decide how to recover.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome<T> {
    Inserted(T),
    Conflict,
}

impl<T> InsertOutcome<T> {
    pub fn inserted(self) -> Option<T> {
        match self {
            InsertOutcome::Inserted(value) => Some(value),
            InsertOutcome::Conflict => None,
        }
    }
}

/// The relational store behind every cell. Each method is a single
/// statement committed on its own; multi-statement work goes through
/// [`Store::begin`].
#[async_trait]
pub trait Store: Send + Sync {
    /// Opens a booking transaction. Nothing written through it is visible
    /// until [`BookingTx::commit`].
    async fn begin(&self) -> Result<Box<dyn BookingTx>, StoreError>;

    // Cities and events

    async fn insert_city(&self, name: &str) -> Result<City, StoreError>;

    async fn insert_event(&self, event: &NewEvent) -> Result<Event, StoreError>;

    async fn get_event(&self, event_id: Uuid) -> Result<Option<EventDetails>, StoreError>;

    /// Events whose city name matches case-insensitively, earliest first.
    /// An empty name matches every city.
    async fn find_events_in_city(&self, city_name: &str) -> Result<Vec<EventDetails>, StoreError>;

    /// Non-cancelled appointments for one event day.
    async fn count_active(&self, event_id: Uuid, date: NaiveDate) -> Result<i64, StoreError>;

    // Patients

    async fn find_patient_by_phone(&self, phone: &str) -> Result<Option<Patient>, StoreError>;

    /// Returns `Conflict` instead of an error when the phone already exists.
    async fn insert_patient(&self, patient: &NewPatient) -> Result<InsertOutcome<Patient>, StoreError>;

    // Appointments

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError>;

    async fn list_appointments_by_event(&self, event_id: Uuid) -> Result<Vec<Appointment>, StoreError>;

    async fn delete_appointment(&self, appointment_id: Uuid) -> Result<bool, StoreError>;

    /// Scheduled, not yet reminded appointments on `date`.
    async fn due_reminders(&self, date: NaiveDate) -> Result<Vec<ReminderCandidate>, StoreError>;

    /// Sets the reminder flag only if it is still unset. Returns whether this
    /// call flipped it.
    async fn mark_reminder_sent(
        &self,
        appointment_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    // Conversation sessions

    async fn get_session(&self, phone: &str) -> Result<Option<ConversationSession>, StoreError>;

    async fn insert_session(
        &self,
        phone: &str,
        schema_version: i32,
    ) -> Result<InsertOutcome<ConversationSession>, StoreError>;

    async fn delete_session(&self, phone: &str) -> Result<bool, StoreError>;

    /// Deletes the session only if it was written under a version other
    /// than `expected_version`. A current-version row is left alone.
    async fn delete_stale_session(&self, phone: &str, expected_version: i32) -> Result<bool, StoreError>;

    async fn set_session_status(&self, phone: &str, status: SessionStatus) -> Result<bool, StoreError>;

    async fn save_session_metadata(&self, phone: &str, metadata: &Value) -> Result<bool, StoreError>;

    // Conversation log

    async fn append_log(
        &self,
        phone: &str,
        direction: Direction,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<ConversationLogEntry, StoreError>;

    /// The last `limit` entries for `phone`, oldest first.
    async fn recent_log(&self, phone: &str, limit: i64) -> Result<Vec<ConversationLogEntry>, StoreError>;

    async fn last_inbound_at(&self, phone: &str) -> Result<Option<DateTime<Utc>>, StoreError>;
}

/// A transaction that serializes writers of one event. `lock_event` must be
/// the first call; every later read sees the state as of that lock.
#[async_trait]
pub trait BookingTx: Send {
    async fn lock_event(&mut self, event_id: Uuid) -> Result<Option<EventDetails>, StoreError>;

    async fn count_active(&mut self, event_id: Uuid, date: NaiveDate) -> Result<i64, StoreError>;

    async fn find_active_booking(
        &mut self,
        patient_id: Uuid,
        event_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<Uuid>, StoreError>;

    /// `Conflict` when an active row for (patient, event, date) already exists.
    async fn insert_appointment(
        &mut self,
        appointment: &NewAppointment,
    ) -> Result<InsertOutcome<Appointment>, StoreError>;

    async fn get_appointment(&mut self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError>;

    async fn set_appointment_status(
        &mut self,
        appointment_id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Option<Appointment>, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
