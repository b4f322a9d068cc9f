use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{BookingTx, InsertOutcome, MemoryStore, Store, StoreError};
use shared_models::{
    Appointment, City, ConversationLogEntry, ConversationSession, Direction, Event, EventDetails,
    NewEvent, NewPatient, Patient, ReminderCandidate, SessionStatus,
};

use crate::signature::sign;

pub struct TestConfig {
    pub webhook_app_secret: String,
    pub webhook_verify_token: String,
    pub admin_api_token: String,
    pub whatsapp_api_base_url: String,
    pub nlu_base_url: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            webhook_app_secret: "test-app-secret".to_string(),
            webhook_verify_token: "test-verify-token".to_string(),
            admin_api_token: "test-admin-token".to_string(),
            whatsapp_api_base_url: "http://localhost:9".to_string(),
            nlu_base_url: "http://localhost:9".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_upstreams(base_url: &str) -> Self {
        Self {
            whatsapp_api_base_url: base_url.to_string(),
            nlu_base_url: base_url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            whatsapp_api_base_url: self.whatsapp_api_base_url.clone(),
            whatsapp_phone_number_id: "1234567890".to_string(),
            whatsapp_access_token: "test-access-token".to_string(),
            webhook_verify_token: self.webhook_verify_token.clone(),
            webhook_app_secret: self.webhook_app_secret.clone(),
            nlu_base_url: self.nlu_base_url.clone(),
            nlu_api_key: "test-nlu-key".to_string(),
            admin_api_token: self.admin_api_token.clone(),
            upstream_timeout_seconds: 2,
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }

    /// Header value for a webhook body signed with this config's secret.
    pub fn sign_body(&self, body: &[u8]) -> String {
        sign(&self.webhook_app_secret, body)
    }
}

pub fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("test dates use YYYY-MM-DD")
}

/// A memory store with one city and the event the booking scenarios use:
/// capacity 2 from 2025-06-01 to 2025-06-03.
pub struct SeededStore {
    pub store: Arc<MemoryStore>,
    pub city: City,
    pub event: Event,
}

impl SeededStore {
    pub async fn new() -> Result<Self, StoreError> {
        Self::with_event("Oaxaca", "Centro de Salud Reforma", "2025-06-01", "2025-06-03", 2).await
    }

    pub async fn with_event(
        city_name: &str,
        location: &str,
        start: &str,
        end: &str,
        max_capacity: i32,
    ) -> Result<Self, StoreError> {
        let store = Arc::new(MemoryStore::new());
        let city = store.insert_city(city_name).await?;
        let event = store
            .insert_event(&NewEvent {
                city_id: city.id,
                location: location.to_string(),
                start_date: date(start),
                end_date: date(end),
                max_capacity,
                notes: None,
            })
            .await?;
        Ok(Self { store, city, event })
    }

    pub async fn add_event(&self, location: &str, start: &str, end: &str, max_capacity: i32) -> Result<Event, StoreError> {
        self.store
            .insert_event(&NewEvent {
                city_id: self.city.id,
                location: location.to_string(),
                start_date: date(start),
                end_date: date(end),
                max_capacity,
                notes: None,
            })
            .await
    }

    pub fn dyn_store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }
}

type Interleaving = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// Wraps a [`MemoryStore`] to reproduce races a single-threaded test cannot
/// hit on its own. Session and patient inserts can be forced to conflict,
/// a one-shot task can run between a session read and its return, and
/// writes of one session status can be made to fail.
pub struct InterleavedStore {
    inner: Arc<MemoryStore>,
    conflict_inserts: bool,
    failing_status: Option<SessionStatus>,
    insert_attempts: AtomicUsize,
    after_session_read: Mutex<Option<Interleaving>>,
}

impl InterleavedStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            conflict_inserts: false,
            failing_status: None,
            insert_attempts: AtomicUsize::new(0),
            after_session_read: Mutex::new(None),
        }
    }

    /// Every `insert_session` and `insert_patient` reports `Conflict`
    /// without touching the inner store.
    pub fn always_conflicting(inner: Arc<MemoryStore>) -> Self {
        Self {
            conflict_inserts: true,
            ..Self::new(inner)
        }
    }

    /// `set_session_status(_, status)` returns a database error.
    pub fn failing_status_write(mut self, status: SessionStatus) -> Self {
        self.failing_status = Some(status);
        self
    }

    /// Runs `task` once, after the next `get_session` has read its row and
    /// before that row is handed back.
    pub fn interleave_after_session_read<F, Fut>(&self, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let boxed: Interleaving = Box::new(move || Box::pin(task()));
        if let Ok(mut slot) = self.after_session_read.lock() {
            *slot = Some(boxed);
        }
    }

    pub fn insert_attempts(&self) -> usize {
        self.insert_attempts.load(Ordering::SeqCst)
    }

    fn take_interleaving(&self) -> Option<Interleaving> {
        self.after_session_read.lock().ok().and_then(|mut slot| slot.take())
    }
}

#[async_trait]
impl Store for InterleavedStore {
    async fn begin(&self) -> Result<Box<dyn BookingTx>, StoreError> {
        self.inner.begin().await
    }

    async fn insert_city(&self, name: &str) -> Result<City, StoreError> {
        self.inner.insert_city(name).await
    }

    async fn insert_event(&self, event: &NewEvent) -> Result<Event, StoreError> {
        self.inner.insert_event(event).await
    }

    async fn get_event(&self, event_id: Uuid) -> Result<Option<EventDetails>, StoreError> {
        self.inner.get_event(event_id).await
    }

    async fn find_events_in_city(&self, city_name: &str) -> Result<Vec<EventDetails>, StoreError> {
        self.inner.find_events_in_city(city_name).await
    }

    async fn count_active(&self, event_id: Uuid, date: NaiveDate) -> Result<i64, StoreError> {
        self.inner.count_active(event_id, date).await
    }

    async fn find_patient_by_phone(&self, phone: &str) -> Result<Option<Patient>, StoreError> {
        self.inner.find_patient_by_phone(phone).await
    }

    async fn insert_patient(&self, patient: &NewPatient) -> Result<InsertOutcome<Patient>, StoreError> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        if self.conflict_inserts {
            return Ok(InsertOutcome::Conflict);
        }
        self.inner.insert_patient(patient).await
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        self.inner.get_appointment(appointment_id).await
    }

    async fn list_appointments_by_event(&self, event_id: Uuid) -> Result<Vec<Appointment>, StoreError> {
        self.inner.list_appointments_by_event(event_id).await
    }

    async fn delete_appointment(&self, appointment_id: Uuid) -> Result<bool, StoreError> {
        self.inner.delete_appointment(appointment_id).await
    }

    async fn due_reminders(&self, date: NaiveDate) -> Result<Vec<ReminderCandidate>, StoreError> {
        self.inner.due_reminders(date).await
    }

    async fn mark_reminder_sent(
        &self,
        appointment_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner.mark_reminder_sent(appointment_id, sent_at).await
    }

    async fn get_session(&self, phone: &str) -> Result<Option<ConversationSession>, StoreError> {
        let session = self.inner.get_session(phone).await?;
        if let Some(task) = self.take_interleaving() {
            task().await;
        }
        Ok(session)
    }

    async fn insert_session(
        &self,
        phone: &str,
        schema_version: i32,
    ) -> Result<InsertOutcome<ConversationSession>, StoreError> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        if self.conflict_inserts {
            return Ok(InsertOutcome::Conflict);
        }
        self.inner.insert_session(phone, schema_version).await
    }

    async fn delete_session(&self, phone: &str) -> Result<bool, StoreError> {
        self.inner.delete_session(phone).await
    }

    async fn delete_stale_session(&self, phone: &str, expected_version: i32) -> Result<bool, StoreError> {
        self.inner.delete_stale_session(phone, expected_version).await
    }

    async fn set_session_status(&self, phone: &str, status: SessionStatus) -> Result<bool, StoreError> {
        if self.failing_status == Some(status) {
            return Err(StoreError::Database("connection reset".to_string()));
        }
        self.inner.set_session_status(phone, status).await
    }

    async fn save_session_metadata(&self, phone: &str, metadata: &Value) -> Result<bool, StoreError> {
        self.inner.save_session_metadata(phone, metadata).await
    }

    async fn append_log(
        &self,
        phone: &str,
        direction: Direction,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<ConversationLogEntry, StoreError> {
        self.inner.append_log(phone, direction, message, at).await
    }

    async fn recent_log(&self, phone: &str, limit: i64) -> Result<Vec<ConversationLogEntry>, StoreError> {
        self.inner.recent_log(phone, limit).await
    }

    async fn last_inbound_at(&self, phone: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.inner.last_inbound_at(phone).await
    }
}
