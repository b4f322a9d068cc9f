use std::sync::Arc;

use assert_matches::assert_matches;
use futures::future::join_all;

use patient_cell::{PatientError, PatientService, ResolvePatientRequest};
use shared_database::{MemoryStore, Store};
use shared_models::ErrorKind;
use shared_utils::test_utils::InterleavedStore;

fn request(phone: &str, name: &str, city: &str) -> ResolvePatientRequest {
    ResolvePatientRequest {
        phone: phone.to_string(),
        name: Some(name.to_string()),
        city: Some(city.to_string()),
        neighborhood: Some("Centro".to_string()),
        reason: Some("Consulta general".to_string()),
    }
}

#[tokio::test]
async fn test_resolve_creates_patient_on_first_contact() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let service = PatientService::new(store.clone());

    let patient = service.resolve(&request("+5215550001", "Ana", "Oaxaca")).await.unwrap();

    assert_eq!(patient.phone, "+5215550001");
    assert_eq!(patient.name.as_deref(), Some("Ana"));
    assert_eq!(patient.city.as_deref(), Some("Oaxaca"));
}

#[tokio::test]
async fn test_repeat_contact_keeps_first_written_identity() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let service = PatientService::new(store.clone());

    let first = service.resolve(&request("+5215550001", "Ana", "Oaxaca")).await.unwrap();
    let second = service.resolve(&request("+5215550001", "Ana María", "Puebla")).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.name.as_deref(), Some("Ana"));
    assert_eq!(second.city.as_deref(), Some("Oaxaca"));
}

#[tokio::test]
async fn test_concurrent_resolution_yields_one_patient() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let service = Arc::new(PatientService::new(store.clone()));

    let attempts = (0..8).map(|i| {
        let service = Arc::clone(&service);
        async move { service.resolve(&request("+5215550009", &format!("Caller {}", i), "Oaxaca")).await }
    });
    let results = join_all(attempts).await;

    let ids: Vec<_> = results.into_iter().map(|r| r.unwrap().id).collect();
    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test]
async fn test_blank_fields_are_stored_as_absent() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let service = PatientService::new(store);

    let patient = service
        .resolve(&ResolvePatientRequest {
            phone: "+5215550002".to_string(),
            name: Some("   ".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(patient.name, None);
}

#[tokio::test]
async fn test_missing_phone_is_invalid_input() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let service = PatientService::new(store);

    let result = service.resolve(&ResolvePatientRequest::default()).await;

    assert_matches!(result, Err(PatientError::MissingPhone));
}

#[tokio::test]
async fn test_conflict_without_a_row_reports_vanished() {
    let interleaved = Arc::new(InterleavedStore::always_conflicting(Arc::new(MemoryStore::new())));
    let service = PatientService::new(interleaved.clone());

    let err = service.resolve(&request("+5215550001", "Ana", "Oaxaca")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StorageFailure);
    assert_matches!(err, PatientError::Vanished(phone) if phone == "+5215550001");
    assert_eq!(interleaved.insert_attempts(), 1);
}
