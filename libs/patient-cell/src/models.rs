use serde::{Deserialize, Serialize};
use thiserror::Error;

use shared_database::StoreError;
use shared_models::{ErrorKind, NewPatient};

/// Fields proposed for a patient on first contact. Only used when no
/// patient with `phone` exists yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolvePatientRequest {
    pub phone: String,
    pub name: Option<String>,
    pub city: Option<String>,
    pub neighborhood: Option<String>,
    pub reason: Option<String>,
}

impl ResolvePatientRequest {
    pub(crate) fn to_new_patient(&self, phone: String) -> NewPatient {
        NewPatient {
            phone,
            name: clean(&self.name),
            city: clean(&self.city),
            neighborhood: clean(&self.neighborhood),
            reason: clean(&self.reason),
        }
    }
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Error)]
pub enum PatientError {
    #[error("Phone number is required")]
    MissingPhone,

    #[error("Patient {0} disappeared while resolving a duplicate insert")]
    Vanished(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PatientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PatientError::MissingPhone => ErrorKind::InvalidInput,
            PatientError::Vanished(_) => ErrorKind::StorageFailure,
            PatientError::Store(e) => e.kind(),
        }
    }
}
