pub mod patient;

pub use patient::{normalize_phone, PatientService};
