use std::sync::Arc;

use tracing::{debug, info, warn};

use shared_database::{InsertOutcome, Store};
use shared_models::Patient;

use crate::models::{PatientError, ResolvePatientRequest};

/// Find-or-create of patients keyed by phone number. Identity fields are
/// first-write-wins: a repeat contact never overwrites name or city.
pub struct PatientService {
    store: Arc<dyn Store>,
}

impl PatientService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, request: &ResolvePatientRequest) -> Result<Patient, PatientError> {
        let phone = normalize_phone(&request.phone).ok_or(PatientError::MissingPhone)?;

        if let Some(existing) = self.store.find_patient_by_phone(&phone).await? {
            debug!("Resolved existing patient {} for {}", existing.id, phone);
            return Ok(existing);
        }

        match self.store.insert_patient(&request.to_new_patient(phone.clone())).await? {
            InsertOutcome::Inserted(patient) => {
                info!("Created patient {} for {}", patient.id, phone);
                Ok(patient)
            }
            InsertOutcome::Conflict => {
                warn!("Concurrent patient insert for {}, re-reading", phone);
                self.store
                    .find_patient_by_phone(&phone)
                    .await?
                    .ok_or(PatientError::Vanished(phone))
            }
        }
    }

    pub async fn find_by_phone(&self, phone: &str) -> Result<Option<Patient>, PatientError> {
        match normalize_phone(phone) {
            Some(phone) => Ok(self.store.find_patient_by_phone(&phone).await?),
            None => Ok(None),
        }
    }
}

/// Strips whitespace and separators the channel sometimes includes.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let phone: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();
    if phone.is_empty() {
        None
    } else {
        Some(phone)
    }
}
