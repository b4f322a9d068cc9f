use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use shared_models::{
    Appointment, AppointmentStatus, City, ConversationLogEntry, ConversationSession, Direction,
    Event, EventDetails, NewAppointment, NewEvent, NewPatient, Patient, ReminderCandidate,
    SessionStatus,
};

use crate::store::{BookingTx, InsertOutcome, Store, StoreError};

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => StoreError::Decode(err.to_string()),
            other => StoreError::Database(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Migration(err.to_string())
    }
}

const EVENT_COLUMNS: &str = "e.id, e.city_id, e.location, e.start_date, e.end_date, \
     e.max_capacity, e.notes, e.created_at, c.name AS city_name";

const APPOINTMENT_COLUMNS: &str = "id, patient_id, event_id, appointment_date, status, \
     reminder_sent, reminder_sent_at, created_at, updated_at";

const SESSION_COLUMNS: &str = "id, phone, status, schema_version, metadata, created_at, updated_at";

#[derive(Debug, FromRow)]
struct EventRow {
    id: Uuid,
    city_id: Uuid,
    location: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    max_capacity: i32,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    city_name: String,
}

impl From<EventRow> for EventDetails {
    fn from(row: EventRow) -> Self {
        EventDetails {
            event: Event {
                id: row.id,
                city_id: row.city_id,
                location: row.location,
                start_date: row.start_date,
                end_date: row.end_date,
                max_capacity: row.max_capacity,
                notes: row.notes,
                created_at: row.created_at,
            },
            city_name: row.city_name,
        }
    }
}

#[derive(Debug, FromRow)]
struct PatientRow {
    id: Uuid,
    phone: String,
    name: Option<String>,
    city: Option<String>,
    neighborhood: Option<String>,
    reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<PatientRow> for Patient {
    fn from(row: PatientRow) -> Self {
        Patient {
            id: row.id,
            phone: row.phone,
            name: row.name,
            city: row.city,
            neighborhood: row.neighborhood,
            reason: row.reason,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct AppointmentRow {
    id: Uuid,
    patient_id: Uuid,
    event_id: Uuid,
    appointment_date: NaiveDate,
    status: String,
    reminder_sent: bool,
    reminder_sent_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = StoreError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        Ok(Appointment {
            id: row.id,
            patient_id: row.patient_id,
            event_id: row.event_id,
            appointment_date: row.appointment_date,
            status: row.status.parse::<AppointmentStatus>().map_err(StoreError::Decode)?,
            reminder_sent: row.reminder_sent,
            reminder_sent_at: row.reminder_sent_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SessionRow {
    id: Uuid,
    phone: String,
    status: String,
    schema_version: i32,
    metadata: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for ConversationSession {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(ConversationSession {
            id: row.id,
            phone: row.phone,
            status: row.status.parse::<SessionStatus>().map_err(StoreError::Decode)?,
            schema_version: row.schema_version,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct LogRow {
    id: Uuid,
    phone: String,
    direction: String,
    message: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<LogRow> for ConversationLogEntry {
    type Error = StoreError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        Ok(ConversationLogEntry {
            id: row.id,
            phone: row.phone,
            direction: row.direction.parse::<Direction>().map_err(StoreError::Decode)?,
            message: row.message,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ReminderRow {
    appointment_id: Uuid,
    appointment_date: NaiveDate,
    phone: String,
    patient_name: Option<String>,
    location: String,
    city_name: String,
}

/// PostgreSQL-backed store. Booking transactions lock the event row with
/// `SELECT ... FOR UPDATE`, so concurrent bookings for the same event run
/// one after another and the capacity count is never read stale.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        debug!("Connecting to PostgreSQL with up to {} connections", max_connections);
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn BookingTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgBookingTx { tx }))
    }

    async fn insert_city(&self, name: &str) -> Result<City, StoreError> {
        let (id, name): (Uuid, String) = sqlx::query_as(
            "INSERT INTO cities (id, name) VALUES ($1, $2) RETURNING id, name",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(City { id, name })
    }

    async fn insert_event(&self, event: &NewEvent) -> Result<Event, StoreError> {
        event.validate().map_err(StoreError::InvalidRecord)?;

        let row: EventRow = sqlx::query_as(&format!(
            r#"
            WITH e AS (
                INSERT INTO events (id, city_id, location, start_date, end_date, max_capacity, notes)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
            )
            SELECT {EVENT_COLUMNS} FROM e JOIN cities c ON c.id = e.city_id
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(event.city_id)
        .bind(&event.location)
        .bind(event.start_date)
        .bind(event.end_date)
        .bind(event.max_capacity)
        .bind(&event.notes)
        .fetch_one(&self.pool)
        .await?;
        Ok(EventDetails::from(row).event)
    }

    async fn get_event(&self, event_id: Uuid) -> Result<Option<EventDetails>, StoreError> {
        let row: Option<EventRow> = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS} FROM events e JOIN cities c ON c.id = e.city_id WHERE e.id = $1"
        ))
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(EventDetails::from))
    }

    async fn find_events_in_city(&self, city_name: &str) -> Result<Vec<EventDetails>, StoreError> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM events e JOIN cities c ON c.id = e.city_id
            WHERE $1 = '' OR LOWER(c.name) = LOWER($1)
            ORDER BY e.start_date, e.created_at
            "#
        ))
        .bind(city_name.trim())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(EventDetails::from).collect())
    }

    async fn count_active(&self, event_id: Uuid, date: NaiveDate) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM appointments
            WHERE event_id = $1 AND appointment_date = $2 AND status <> 'cancelled'
            "#,
        )
        .bind(event_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn find_patient_by_phone(&self, phone: &str) -> Result<Option<Patient>, StoreError> {
        let row: Option<PatientRow> = sqlx::query_as(
            "SELECT id, phone, name, city, neighborhood, reason, created_at FROM patients WHERE phone = $1",
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Patient::from))
    }

    async fn insert_patient(&self, patient: &NewPatient) -> Result<InsertOutcome<Patient>, StoreError> {
        let row: Option<PatientRow> = sqlx::query_as(
            r#"
            INSERT INTO patients (id, phone, name, city, neighborhood, reason)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (phone) DO NOTHING
            RETURNING id, phone, name, city, neighborhood, reason, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&patient.phone)
        .bind(&patient.name)
        .bind(&patient.city)
        .bind(&patient.neighborhood)
        .bind(&patient.reason)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(row) => InsertOutcome::Inserted(row.into()),
            None => InsertOutcome::Conflict,
        })
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let row: Option<AppointmentRow> = sqlx::query_as(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = $1"
        ))
        .bind(appointment_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Appointment::try_from).transpose()
    }

    async fn list_appointments_by_event(&self, event_id: Uuid) -> Result<Vec<Appointment>, StoreError> {
        let rows: Vec<AppointmentRow> = sqlx::query_as(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE event_id = $1 \
             ORDER BY appointment_date, created_at"
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Appointment::try_from).collect()
    }

    async fn delete_appointment(&self, appointment_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM appointments WHERE id = $1")
            .bind(appointment_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn due_reminders(&self, date: NaiveDate) -> Result<Vec<ReminderCandidate>, StoreError> {
        let rows: Vec<ReminderRow> = sqlx::query_as(
            r#"
            SELECT a.id AS appointment_id, a.appointment_date, p.phone, p.name AS patient_name,
                   e.location, c.name AS city_name
            FROM appointments a
            JOIN patients p ON p.id = a.patient_id
            JOIN events e ON e.id = a.event_id
            JOIN cities c ON c.id = e.city_id
            WHERE a.appointment_date = $1
              AND a.status = 'scheduled'
              AND a.reminder_sent = FALSE
            ORDER BY a.created_at
            "#,
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ReminderCandidate {
                appointment_id: row.appointment_id,
                appointment_date: row.appointment_date,
                phone: row.phone,
                patient_name: row.patient_name,
                location: row.location,
                city_name: row.city_name,
            })
            .collect())
    }

    async fn mark_reminder_sent(
        &self,
        appointment_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE appointments
            SET reminder_sent = TRUE, reminder_sent_at = $2, updated_at = NOW()
            WHERE id = $1 AND reminder_sent = FALSE
            "#,
        )
        .bind(appointment_id)
        .bind(sent_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn get_session(&self, phone: &str) -> Result<Option<ConversationSession>, StoreError> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM conversation_sessions WHERE phone = $1"
        ))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ConversationSession::try_from).transpose()
    }

    async fn insert_session(
        &self,
        phone: &str,
        schema_version: i32,
    ) -> Result<InsertOutcome<ConversationSession>, StoreError> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            r#"
            INSERT INTO conversation_sessions (id, phone, status, schema_version, metadata)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (phone) DO NOTHING
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(phone)
        .bind(SessionStatus::Active.as_str())
        .bind(schema_version)
        .bind(json!({}))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(InsertOutcome::Inserted(row.try_into()?)),
            None => Ok(InsertOutcome::Conflict),
        }
    }

    async fn delete_session(&self, phone: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM conversation_sessions WHERE phone = $1")
            .bind(phone)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_stale_session(&self, phone: &str, expected_version: i32) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM conversation_sessions WHERE phone = $1 AND schema_version <> $2",
        )
        .bind(phone)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_session_status(&self, phone: &str, status: SessionStatus) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE conversation_sessions SET status = $2, updated_at = NOW() WHERE phone = $1",
        )
        .bind(phone)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_session_metadata(&self, phone: &str, metadata: &Value) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE conversation_sessions SET metadata = $2, updated_at = NOW() WHERE phone = $1",
        )
        .bind(phone)
        .bind(metadata)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn append_log(
        &self,
        phone: &str,
        direction: Direction,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<ConversationLogEntry, StoreError> {
        let row: LogRow = sqlx::query_as(
            r#"
            INSERT INTO conversation_logs (id, phone, direction, message, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, phone, direction, message, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(phone)
        .bind(direction.as_str())
        .bind(message)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn recent_log(&self, phone: &str, limit: i64) -> Result<Vec<ConversationLogEntry>, StoreError> {
        let rows: Vec<LogRow> = sqlx::query_as(
            r#"
            SELECT id, phone, direction, message, created_at FROM (
                SELECT id, phone, direction, message, created_at
                FROM conversation_logs
                WHERE phone = $1
                ORDER BY created_at DESC
                LIMIT $2
            ) recent
            ORDER BY created_at ASC
            "#,
        )
        .bind(phone)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ConversationLogEntry::try_from).collect()
    }

    async fn last_inbound_at(&self, phone: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let (last,): (Option<DateTime<Utc>>,) = sqlx::query_as(
            "SELECT MAX(created_at) FROM conversation_logs WHERE phone = $1 AND direction = 'in'",
        )
        .bind(phone)
        .fetch_one(&self.pool)
        .await?;
        Ok(last)
    }
}

pub struct PgBookingTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BookingTx for PgBookingTx {
    async fn lock_event(&mut self, event_id: Uuid) -> Result<Option<EventDetails>, StoreError> {
        let row: Option<EventRow> = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS} FROM events e JOIN cities c ON c.id = e.city_id \
             WHERE e.id = $1 FOR UPDATE OF e"
        ))
        .bind(event_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(EventDetails::from))
    }

    async fn count_active(&mut self, event_id: Uuid, date: NaiveDate) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM appointments
            WHERE event_id = $1 AND appointment_date = $2 AND status <> 'cancelled'
            "#,
        )
        .bind(event_id)
        .bind(date)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }

    async fn find_active_booking(
        &mut self,
        patient_id: Uuid,
        event_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<Uuid>, StoreError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM appointments
            WHERE patient_id = $1 AND event_id = $2 AND appointment_date = $3
              AND status <> 'cancelled'
            LIMIT 1
            "#,
        )
        .bind(patient_id)
        .bind(event_id)
        .bind(date)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(|(id,)| id))
    }

    async fn insert_appointment(
        &mut self,
        appointment: &NewAppointment,
    ) -> Result<InsertOutcome<Appointment>, StoreError> {
        let row: Option<AppointmentRow> = sqlx::query_as(&format!(
            r#"
            INSERT INTO appointments (id, patient_id, event_id, appointment_date, status)
            VALUES ($1, $2, $3, $4, 'scheduled')
            ON CONFLICT (patient_id, event_id, appointment_date) WHERE status <> 'cancelled'
            DO NOTHING
            RETURNING {APPOINTMENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(appointment.patient_id)
        .bind(appointment.event_id)
        .bind(appointment.appointment_date)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(InsertOutcome::Inserted(row.try_into()?)),
            None => Ok(InsertOutcome::Conflict),
        }
    }

    async fn get_appointment(&mut self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let row: Option<AppointmentRow> = sqlx::query_as(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = $1 FOR UPDATE"
        ))
        .bind(appointment_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Appointment::try_from).transpose()
    }

    async fn set_appointment_status(
        &mut self,
        appointment_id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Option<Appointment>, StoreError> {
        let row: Option<AppointmentRow> = sqlx::query_as(&format!(
            "UPDATE appointments SET status = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING {APPOINTMENT_COLUMNS}"
        ))
        .bind(appointment_id)
        .bind(status.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Appointment::try_from).transpose()
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
