// libs/appointment-cell/src/models.rs
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use patient_cell::PatientError;
use shared_database::StoreError;
use shared_models::{AppError, AppointmentStatus, ErrorKind};

// ==============================================================================
// BOOKING MODELS
// ==============================================================================

/// A candidate booking. `date` is kept raw so that unparsable input surfaces
/// as `InvalidDate` from inside the booking transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub phone: String,
    pub name: Option<String>,
    pub city: Option<String>,
    pub neighborhood: Option<String>,
    pub reason: Option<String>,
    pub event_id: Uuid,
    pub date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingConfirmation {
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub location: String,
    pub city_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventCapacity {
    pub event_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub max_capacity: i32,
}

// ==============================================================================
// ADMINISTRATIVE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAppointmentStatusRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CapacityQuery {
    pub date: Option<String>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Error)]
pub enum AppointmentError {
    #[error("Event {0} not found")]
    EventNotFound(Uuid),

    #[error("No event matches {0:?}")]
    UnknownEvent(String),

    #[error("Appointment {0} not found")]
    AppointmentNotFound(Uuid),

    #[error("Invalid appointment date: {0}")]
    InvalidDate(String),

    #[error("Date {date} is outside the event range {start} to {end}")]
    DateOutOfRange {
        date: NaiveDate,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("Event is full on {date}")]
    EventFull { date: NaiveDate },

    #[error("Patient already holds a booking on {date}")]
    AlreadyBooked { date: NaiveDate },

    #[error("Appointment cannot move from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error(transparent)]
    Patient(#[from] PatientError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AppointmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppointmentError::EventNotFound(_)
            | AppointmentError::UnknownEvent(_)
            | AppointmentError::AppointmentNotFound(_) => ErrorKind::NotFound,
            AppointmentError::InvalidDate(_) | AppointmentError::DateOutOfRange { .. } => ErrorKind::InvalidInput,
            AppointmentError::EventFull { .. }
            | AppointmentError::AlreadyBooked { .. }
            | AppointmentError::InvalidStatusTransition { .. } => ErrorKind::Conflict,
            AppointmentError::Patient(e) => e.kind(),
            AppointmentError::Store(e) => e.kind(),
        }
    }

    /// Reply sent back over the chat channel. Input and conflict outcomes get
    /// a specific prompt to try again; everything else gets a generic one.
    pub fn user_message(&self) -> String {
        match self {
            AppointmentError::EventNotFound(_) | AppointmentError::UnknownEvent(_) => {
                "I couldn't find that event. Could you tell me again which location you'd like to attend?"
                    .to_string()
            }
            AppointmentError::InvalidDate(_) => {
                "I didn't understand the date. Could you send it again, for example 2025-06-01?".to_string()
            }
            AppointmentError::DateOutOfRange { start, end, .. } => format!(
                "That date is outside the event. Please choose a day between {} and {}.",
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d")
            ),
            AppointmentError::EventFull { date } => format!(
                "Sorry, {} is already fully booked. Would another day work for you?",
                date.format("%Y-%m-%d")
            ),
            AppointmentError::AlreadyBooked { date } => format!(
                "You already have an appointment on {}. No need to book it again.",
                date.format("%Y-%m-%d")
            ),
            _ => "Something went wrong on our side. Please try again in a few minutes.".to_string(),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        AppError::from_kind(err.kind(), err.to_string())
    }
}
