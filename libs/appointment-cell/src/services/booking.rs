// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use patient_cell::{PatientService, ResolvePatientRequest};
use shared_database::{BookingTx, InsertOutcome, Store};
use shared_models::{Appointment, EventDetails, NewAppointment, Patient};

use crate::models::{AppointmentError, BookingConfirmation, BookingRequest};

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];

/// Turns booking proposals into appointments without ever exceeding an
/// event's per-day capacity.
///
/// Concurrency control: every booking transaction starts by locking the
/// event row (`SELECT ... FOR UPDATE` on PostgreSQL), so the count, the
/// duplicate check and the insert for one event never interleave with
/// another writer. The partial unique index on
/// `(patient_id, event_id, appointment_date)` for non-cancelled rows backs
/// the duplicate check up.
pub struct BookingEngine {
    store: Arc<dyn Store>,
    patients: PatientService,
}

impl BookingEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let patients = PatientService::new(Arc::clone(&store));
        Self { store, patients }
    }

    #[instrument(skip(self, request), fields(phone = %request.phone, event_id = %request.event_id))]
    pub async fn book(&self, request: &BookingRequest) -> Result<BookingConfirmation, AppointmentError> {
        info!("Booking event {} on {:?} for {}", request.event_id, request.date, request.phone);

        // Patient identity is valid on its own and is committed even when
        // the booking below fails.
        let patient = self
            .patients
            .resolve(&ResolvePatientRequest {
                phone: request.phone.clone(),
                name: request.name.clone(),
                city: request.city.clone(),
                neighborhood: request.neighborhood.clone(),
                reason: request.reason.clone(),
            })
            .await?;

        let mut tx = self.store.begin().await?;

        let outcome = self.book_in_transaction(tx.as_mut(), &patient, request).await;
        match outcome {
            Ok((appointment, details)) => {
                tx.commit().await?;
                info!(
                    "Appointment {} booked for patient {} on {}",
                    appointment.id, patient.id, appointment.appointment_date
                );
                Ok(BookingConfirmation {
                    appointment_id: appointment.id,
                    patient_id: patient.id,
                    date: appointment.appointment_date,
                    location: details.event.location,
                    city_name: details.city_name,
                })
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("Rollback after failed booking also failed: {}", rollback_err);
                }
                info!("Booking for {} rejected: {}", request.phone, err);
                Err(err)
            }
        }
    }

    async fn book_in_transaction(
        &self,
        tx: &mut dyn BookingTx,
        patient: &Patient,
        request: &BookingRequest,
    ) -> Result<(Appointment, EventDetails), AppointmentError> {
        let details = tx
            .lock_event(request.event_id)
            .await?
            .ok_or(AppointmentError::EventNotFound(request.event_id))?;
        let event = &details.event;

        let date = parse_appointment_date(&request.date)?;

        if !event.covers(date) {
            return Err(AppointmentError::DateOutOfRange {
                date,
                start: event.start_date,
                end: event.end_date,
            });
        }

        // Duplicates are reported ahead of a full day so a patient retrying
        // their own booking learns they already hold a seat.
        if let Some(existing) = tx.find_active_booking(patient.id, event.id, date).await? {
            debug!("Patient {} already holds appointment {}", patient.id, existing);
            return Err(AppointmentError::AlreadyBooked { date });
        }

        let active = tx.count_active(event.id, date).await?;
        if active >= event.max_capacity as i64 {
            debug!("Event {} full on {} ({}/{})", event.id, date, active, event.max_capacity);
            return Err(AppointmentError::EventFull { date });
        }

        let new = NewAppointment {
            patient_id: patient.id,
            event_id: event.id,
            appointment_date: date,
        };
        let appointment = match tx.insert_appointment(&new).await? {
            InsertOutcome::Inserted(appointment) => appointment,
            InsertOutcome::Conflict => return Err(AppointmentError::AlreadyBooked { date }),
        };

        Ok((appointment, details))
    }

    /// Maps a free-text event hint to an event id. A UUID is taken as is;
    /// otherwise the hint is matched against location labels of events in
    /// `city`, falling back to the only event in that city covering `date`.
    pub async fn resolve_event_hint(
        &self,
        hint: &str,
        city: Option<&str>,
        date: Option<&str>,
    ) -> Result<Uuid, AppointmentError> {
        if let Ok(event_id) = Uuid::parse_str(hint.trim()) {
            return Ok(event_id);
        }

        let city = city.map(str::trim).filter(|c| !c.is_empty()).unwrap_or_default();
        let candidates = self.store.find_events_in_city(city).await?;
        let wanted = hint.trim().to_lowercase();

        if !wanted.is_empty() {
            if let Some(found) = candidates
                .iter()
                .find(|details| details.event.location.to_lowercase().contains(&wanted))
            {
                return Ok(found.event.id);
            }
        }

        if let Some(date) = date.and_then(|raw| parse_appointment_date(raw).ok()) {
            let covering: Vec<&EventDetails> =
                candidates.iter().filter(|details| details.event.covers(date)).collect();
            if let [only] = covering.as_slice() {
                return Ok(only.event.id);
            }
        }

        warn!("No event matches hint {:?} in city {:?}", hint, city);
        Err(AppointmentError::UnknownEvent(hint.trim().to_string()))
    }
}

/// Normalizes the date formats the chat channel produces to a calendar date.
pub fn parse_appointment_date(raw: &str) -> Result<NaiveDate, AppointmentError> {
    let trimmed = raw.trim();

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date);
        }
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(timestamp.date_naive());
    }
    if let Ok(timestamp) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
        return Ok(timestamp.date());
    }

    Err(AppointmentError::InvalidDate(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn accepts_common_date_shapes() {
        let expected = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        for raw in ["2025-06-01", " 01/06/2025 ", "01-06-2025", "2025/06/01", "2025-06-01T09:30:00Z", "2025-06-01T09:30:00"] {
            assert_eq!(parse_appointment_date(raw).unwrap(), expected, "input {:?}", raw);
        }
    }

    #[test]
    fn rejects_unparsable_dates() {
        assert_matches!(parse_appointment_date("next tuesday"), Err(AppointmentError::InvalidDate(_)));
        assert_matches!(parse_appointment_date("2025-02-30"), Err(AppointmentError::InvalidDate(_)));
    }
}
