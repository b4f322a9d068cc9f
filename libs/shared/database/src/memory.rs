use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use shared_models::{
    Appointment, AppointmentStatus, City, ConversationLogEntry, ConversationSession, Direction,
    Event, EventDetails, NewAppointment, NewEvent, NewPatient, Patient, ReminderCandidate,
    SessionStatus,
};

use crate::store::{BookingTx, InsertOutcome, Store, StoreError};

#[derive(Debug, Clone, Default)]
struct Tables {
    cities: Vec<City>,
    events: Vec<Event>,
    patients: Vec<Patient>,
    appointments: Vec<Appointment>,
    sessions: Vec<ConversationSession>,
    logs: Vec<ConversationLogEntry>,
}

impl Tables {
    fn event_details(&self, event_id: Uuid) -> Option<EventDetails> {
        let event = self.events.iter().find(|event| event.id == event_id)?;
        let city = self.cities.iter().find(|city| city.id == event.city_id)?;
        Some(EventDetails {
            event: event.clone(),
            city_name: city.name.clone(),
        })
    }

    fn count_active(&self, event_id: Uuid, date: NaiveDate) -> i64 {
        self.appointments
            .iter()
            .filter(|a| a.event_id == event_id && a.appointment_date == date && a.status.is_active())
            .count() as i64
    }

    fn find_active_booking(&self, patient_id: Uuid, event_id: Uuid, date: NaiveDate) -> Option<Uuid> {
        self.appointments
            .iter()
            .find(|a| {
                a.patient_id == patient_id
                    && a.event_id == event_id
                    && a.appointment_date == date
                    && a.status.is_active()
            })
            .map(|a| a.id)
    }

    fn set_appointment_status(&mut self, appointment_id: Uuid, status: AppointmentStatus) -> Option<Appointment> {
        let appointment = self.appointments.iter_mut().find(|a| a.id == appointment_id)?;
        appointment.status = status;
        appointment.updated_at = Utc::now();
        Some(appointment.clone())
    }
}

/// In-process store with the same contract as the PostgreSQL one. A single
/// mutex guards all tables; an open [`BookingTx`] owns it until commit or
/// rollback, which gives transactions full isolation.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn BookingTx>, StoreError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryBookingTx { guard, working }))
    }

    async fn insert_city(&self, name: &str) -> Result<City, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.cities.iter().any(|city| city.name.eq_ignore_ascii_case(name)) {
            return Err(StoreError::InvalidRecord(format!("city {} already exists", name)));
        }
        let city = City {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        tables.cities.push(city.clone());
        Ok(city)
    }

    async fn insert_event(&self, event: &NewEvent) -> Result<Event, StoreError> {
        event.validate().map_err(StoreError::InvalidRecord)?;

        let mut tables = self.tables.lock().await;
        if !tables.cities.iter().any(|city| city.id == event.city_id) {
            return Err(StoreError::InvalidRecord(format!("city {} does not exist", event.city_id)));
        }
        let created = Event {
            id: Uuid::new_v4(),
            city_id: event.city_id,
            location: event.location.clone(),
            start_date: event.start_date,
            end_date: event.end_date,
            max_capacity: event.max_capacity,
            notes: event.notes.clone(),
            created_at: Utc::now(),
        };
        tables.events.push(created.clone());
        Ok(created)
    }

    async fn get_event(&self, event_id: Uuid) -> Result<Option<EventDetails>, StoreError> {
        Ok(self.tables.lock().await.event_details(event_id))
    }

    async fn find_events_in_city(&self, city_name: &str) -> Result<Vec<EventDetails>, StoreError> {
        let tables = self.tables.lock().await;
        let wanted = city_name.trim().to_lowercase();
        let mut events: Vec<EventDetails> = tables
            .events
            .iter()
            .filter_map(|event| tables.event_details(event.id))
            .filter(|details| wanted.is_empty() || details.city_name.to_lowercase() == wanted)
            .collect();
        events.sort_by(|a, b| {
            (a.event.start_date, a.event.created_at).cmp(&(b.event.start_date, b.event.created_at))
        });
        Ok(events)
    }

    async fn count_active(&self, event_id: Uuid, date: NaiveDate) -> Result<i64, StoreError> {
        Ok(self.tables.lock().await.count_active(event_id, date))
    }

    async fn find_patient_by_phone(&self, phone: &str) -> Result<Option<Patient>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.patients.iter().find(|p| p.phone == phone).cloned())
    }

    async fn insert_patient(&self, patient: &NewPatient) -> Result<InsertOutcome<Patient>, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.patients.iter().any(|p| p.phone == patient.phone) {
            debug!("Patient insert for {} lost to an existing row", patient.phone);
            return Ok(InsertOutcome::Conflict);
        }
        let created = Patient {
            id: Uuid::new_v4(),
            phone: patient.phone.clone(),
            name: patient.name.clone(),
            city: patient.city.clone(),
            neighborhood: patient.neighborhood.clone(),
            reason: patient.reason.clone(),
            created_at: Utc::now(),
        };
        tables.patients.push(created.clone());
        Ok(InsertOutcome::Inserted(created))
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.appointments.iter().find(|a| a.id == appointment_id).cloned())
    }

    async fn list_appointments_by_event(&self, event_id: Uuid) -> Result<Vec<Appointment>, StoreError> {
        let tables = self.tables.lock().await;
        let mut appointments: Vec<Appointment> = tables
            .appointments
            .iter()
            .filter(|a| a.event_id == event_id)
            .cloned()
            .collect();
        appointments.sort_by(|a, b| (a.appointment_date, a.created_at).cmp(&(b.appointment_date, b.created_at)));
        Ok(appointments)
    }

    async fn delete_appointment(&self, appointment_id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        let before = tables.appointments.len();
        tables.appointments.retain(|a| a.id != appointment_id);
        Ok(tables.appointments.len() < before)
    }

    async fn due_reminders(&self, date: NaiveDate) -> Result<Vec<ReminderCandidate>, StoreError> {
        let tables = self.tables.lock().await;
        let mut due: Vec<&Appointment> = tables
            .appointments
            .iter()
            .filter(|a| {
                a.appointment_date == date && a.status == AppointmentStatus::Scheduled && !a.reminder_sent
            })
            .collect();
        due.sort_by_key(|a| a.created_at);

        Ok(due
            .into_iter()
            .filter_map(|appointment| {
                let patient = tables.patients.iter().find(|p| p.id == appointment.patient_id)?;
                let details = tables.event_details(appointment.event_id)?;
                Some(ReminderCandidate {
                    appointment_id: appointment.id,
                    appointment_date: appointment.appointment_date,
                    phone: patient.phone.clone(),
                    patient_name: patient.name.clone(),
                    location: details.event.location,
                    city_name: details.city_name,
                })
            })
            .collect())
    }

    async fn mark_reminder_sent(
        &self,
        appointment_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        match tables
            .appointments
            .iter_mut()
            .find(|a| a.id == appointment_id && !a.reminder_sent)
        {
            Some(appointment) => {
                appointment.reminder_sent = true;
                appointment.reminder_sent_at = Some(sent_at);
                appointment.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_session(&self, phone: &str) -> Result<Option<ConversationSession>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.sessions.iter().find(|s| s.phone == phone).cloned())
    }

    async fn insert_session(
        &self,
        phone: &str,
        schema_version: i32,
    ) -> Result<InsertOutcome<ConversationSession>, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.sessions.iter().any(|s| s.phone == phone) {
            return Ok(InsertOutcome::Conflict);
        }
        let now = Utc::now();
        let session = ConversationSession {
            id: Uuid::new_v4(),
            phone: phone.to_string(),
            status: SessionStatus::Active,
            schema_version,
            metadata: json!({}),
            created_at: now,
            updated_at: now,
        };
        tables.sessions.push(session.clone());
        Ok(InsertOutcome::Inserted(session))
    }

    async fn delete_session(&self, phone: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|s| s.phone != phone);
        Ok(tables.sessions.len() < before)
    }

    async fn delete_stale_session(&self, phone: &str, expected_version: i32) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        let before = tables.sessions.len();
        tables
            .sessions
            .retain(|s| s.phone != phone || s.schema_version == expected_version);
        Ok(tables.sessions.len() < before)
    }

    async fn set_session_status(&self, phone: &str, status: SessionStatus) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        match tables.sessions.iter_mut().find(|s| s.phone == phone) {
            Some(session) => {
                session.status = status;
                session.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn save_session_metadata(&self, phone: &str, metadata: &Value) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        match tables.sessions.iter_mut().find(|s| s.phone == phone) {
            Some(session) => {
                session.metadata = metadata.clone();
                session.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn append_log(
        &self,
        phone: &str,
        direction: Direction,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<ConversationLogEntry, StoreError> {
        let entry = ConversationLogEntry {
            id: Uuid::new_v4(),
            phone: phone.to_string(),
            direction,
            message: message.to_string(),
            created_at: at,
        };
        self.tables.lock().await.logs.push(entry.clone());
        Ok(entry)
    }

    async fn recent_log(&self, phone: &str, limit: i64) -> Result<Vec<ConversationLogEntry>, StoreError> {
        let tables = self.tables.lock().await;
        let mut entries: Vec<ConversationLogEntry> =
            tables.logs.iter().filter(|e| e.phone == phone).cloned().collect();
        entries.sort_by_key(|e| e.created_at);
        let skip = entries.len().saturating_sub(limit.max(0) as usize);
        Ok(entries.split_off(skip))
    }

    async fn last_inbound_at(&self, phone: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .logs
            .iter()
            .filter(|e| e.phone == phone && e.direction == Direction::In)
            .map(|e| e.created_at)
            .max())
    }
}

pub struct MemoryBookingTx {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl BookingTx for MemoryBookingTx {
    async fn lock_event(&mut self, event_id: Uuid) -> Result<Option<EventDetails>, StoreError> {
        Ok(self.working.event_details(event_id))
    }

    async fn count_active(&mut self, event_id: Uuid, date: NaiveDate) -> Result<i64, StoreError> {
        Ok(self.working.count_active(event_id, date))
    }

    async fn find_active_booking(
        &mut self,
        patient_id: Uuid,
        event_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<Uuid>, StoreError> {
        Ok(self.working.find_active_booking(patient_id, event_id, date))
    }

    async fn insert_appointment(
        &mut self,
        appointment: &NewAppointment,
    ) -> Result<InsertOutcome<Appointment>, StoreError> {
        if self
            .working
            .find_active_booking(appointment.patient_id, appointment.event_id, appointment.appointment_date)
            .is_some()
        {
            return Ok(InsertOutcome::Conflict);
        }
        let now = Utc::now();
        let created = Appointment {
            id: Uuid::new_v4(),
            patient_id: appointment.patient_id,
            event_id: appointment.event_id,
            appointment_date: appointment.appointment_date,
            status: AppointmentStatus::Scheduled,
            reminder_sent: false,
            reminder_sent_at: None,
            created_at: now,
            updated_at: now,
        };
        self.working.appointments.push(created.clone());
        Ok(InsertOutcome::Inserted(created))
    }

    async fn get_appointment(&mut self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.working.appointments.iter().find(|a| a.id == appointment_id).cloned())
    }

    async fn set_appointment_status(
        &mut self,
        appointment_id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Option<Appointment>, StoreError> {
        Ok(self.working.set_appointment_status(appointment_id, status))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryBookingTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
