use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ==============================================================================
// EVENTS AND CITIES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct City {
    pub id: Uuid,
    pub name: String,
}

/// A multi-day activity at one location. `max_capacity` applies to each
/// calendar day of the range, not to the range as a whole.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: Uuid,
    pub city_id: Uuid,
    pub location: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub max_capacity: i32,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Inclusive on both ends.
    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewEvent {
    pub city_id: Uuid,
    pub location: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub max_capacity: i32,
    pub notes: Option<String>,
}

impl NewEvent {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_capacity <= 0 {
            return Err(format!("max_capacity must be positive, got {}", self.max_capacity));
        }
        if self.start_date > self.end_date {
            return Err(format!(
                "start_date {} is after end_date {}",
                self.start_date, self.end_date
            ));
        }
        Ok(())
    }
}

/// Event joined with its city name, the shape needed to compose messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventDetails {
    pub event: Event,
    pub city_name: String,
}

// ==============================================================================
// PATIENTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub id: Uuid,
    pub phone: String,
    pub name: Option<String>,
    pub city: Option<String>,
    pub neighborhood: Option<String>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewPatient {
    pub phone: String,
    pub name: Option<String>,
    pub city: Option<String>,
    pub neighborhood: Option<String>,
    pub reason: Option<String>,
}

// ==============================================================================
// APPOINTMENTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    /// Cancelled rows stay in the table but no longer hold a seat.
    pub fn is_active(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            "completed" => Ok(AppointmentStatus::Completed),
            other => Err(format!("unknown appointment status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub event_id: Uuid,
    pub appointment_date: NaiveDate,
    pub status: AppointmentStatus,
    pub reminder_sent: bool,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAppointment {
    pub patient_id: Uuid,
    pub event_id: Uuid,
    pub appointment_date: NaiveDate,
}

/// Everything the reminder job needs for one recipient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReminderCandidate {
    pub appointment_id: Uuid,
    pub appointment_date: NaiveDate,
    pub phone: String,
    pub patient_name: Option<String>,
    pub location: String,
    pub city_name: String,
}

// ==============================================================================
// CONVERSATIONS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "completed" => Ok(SessionStatus::Completed),
            other => Err(format!("unknown session status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationSession {
    pub id: Uuid,
    pub phone: String,
    pub status: SessionStatus,
    pub schema_version: i32,
    /// Opaque bag owned by the language-understanding collaborator.
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(Direction::In),
            "out" => Ok(Direction::Out),
            other => Err(format!("unknown message direction: {}", other)),
        }
    }
}

/// Append-only record of one message crossing the channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationLogEntry {
    pub id: Uuid,
    pub phone: String,
    pub direction: Direction,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(start: &str, end: &str) -> Event {
        Event {
            id: Uuid::new_v4(),
            city_id: Uuid::new_v4(),
            location: "Plaza".to_string(),
            start_date: start.parse().unwrap(),
            end_date: end.parse().unwrap(),
            max_capacity: 1,
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn event_range_is_inclusive() {
        let event = event("2025-06-01", "2025-06-03");
        assert!(event.covers("2025-06-01".parse().unwrap()));
        assert!(event.covers("2025-06-03".parse().unwrap()));
        assert!(!event.covers("2025-05-31".parse().unwrap()));
        assert!(!event.covers("2025-06-04".parse().unwrap()));
    }

    #[test]
    fn cancelled_is_the_only_inactive_status() {
        assert!(AppointmentStatus::Scheduled.is_active());
        assert!(AppointmentStatus::Completed.is_active());
        assert!(!AppointmentStatus::Cancelled.is_active());
    }

    #[test]
    fn status_strings_parse_back() {
        for status in [AppointmentStatus::Scheduled, AppointmentStatus::Cancelled, AppointmentStatus::Completed] {
            assert_eq!(status.as_str().parse::<AppointmentStatus>().unwrap(), status);
        }
        assert!("pending".parse::<AppointmentStatus>().is_err());
        assert_eq!("in".parse::<Direction>().unwrap(), Direction::In);
        assert_eq!("completed".parse::<SessionStatus>().unwrap(), SessionStatus::Completed);
    }
}
