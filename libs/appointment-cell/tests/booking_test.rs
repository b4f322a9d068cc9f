use std::sync::Arc;

use assert_matches::assert_matches;
use futures::future::join_all;

use appointment_cell::{AppointmentError, BookingEngine, BookingRequest, CapacityLedger};
use shared_database::Store;
use shared_models::AppointmentStatus;
use shared_utils::test_utils::{date, SeededStore};

fn request(phone: &str, event_id: uuid::Uuid, day: &str) -> BookingRequest {
    BookingRequest {
        phone: phone.to_string(),
        name: Some(format!("Patient {}", phone)),
        city: Some("Oaxaca".to_string()),
        neighborhood: None,
        reason: Some("checkup".to_string()),
        event_id,
        date: day.to_string(),
    }
}

#[tokio::test]
async fn test_capacity_and_duplicate_rules_on_one_event() {
    let seeded = SeededStore::new().await.unwrap();
    let engine = BookingEngine::new(seeded.dyn_store());
    let event_id = seeded.event.id;

    let a = engine.book(&request("+5215550000001", event_id, "2025-06-01")).await.unwrap();
    let b = engine.book(&request("+5215550000002", event_id, "2025-06-01")).await.unwrap();
    assert_ne!(a.patient_id, b.patient_id);
    assert_eq!(a.location, "Centro de Salud Reforma");
    assert_eq!(a.city_name, "Oaxaca");

    let c = engine.book(&request("+5215550000003", event_id, "2025-06-01")).await;
    assert_matches!(c, Err(AppointmentError::EventFull { .. }));

    let a_again = engine.book(&request("+5215550000001", event_id, "2025-06-01")).await;
    assert_matches!(a_again, Err(AppointmentError::AlreadyBooked { .. }));

    let a_next_day = engine.book(&request("+5215550000001", event_id, "2025-06-02")).await.unwrap();
    assert_eq!(a_next_day.patient_id, a.patient_id);
    assert_eq!(a_next_day.date, date("2025-06-02"));

    assert_eq!(seeded.store.count_active(event_id, date("2025-06-01")).await.unwrap(), 2);
    assert_eq!(seeded.store.count_active(event_id, date("2025-06-02")).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bookings_never_exceed_capacity() {
    let seeded = SeededStore::with_event("Puebla", "Clinica Norte", "2025-07-10", "2025-07-10", 3)
        .await
        .unwrap();
    let engine = Arc::new(BookingEngine::new(seeded.dyn_store()));
    let event_id = seeded.event.id;

    let handles = (0..10).map(|i| {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine
                .book(&request(&format!("+52155500010{:02}", i), event_id, "2025-07-10"))
                .await
        })
    });
    let results: Vec<_> = join_all(handles).await.into_iter().map(|r| r.unwrap()).collect();

    let booked = results.iter().filter(|r| r.is_ok()).count();
    let full = results
        .iter()
        .filter(|r| matches!(r, Err(AppointmentError::EventFull { .. })))
        .count();
    assert_eq!(booked, 3);
    assert_eq!(full, 7);
    assert_eq!(seeded.store.count_active(event_id, date("2025-07-10")).await.unwrap(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicates_from_one_patient_book_once() {
    let seeded = SeededStore::new().await.unwrap();
    let engine = Arc::new(BookingEngine::new(seeded.dyn_store()));
    let event_id = seeded.event.id;

    let handles = (0..5).map(|_| {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.book(&request("+5215550000099", event_id, "2025-06-03")).await })
    });
    let results: Vec<_> = join_all(handles).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter(|r| r.is_err())
        .all(|r| matches!(r, Err(AppointmentError::AlreadyBooked { .. }))));
}

#[tokio::test]
async fn test_out_of_range_date_leaves_no_row() {
    let seeded = SeededStore::new().await.unwrap();
    let engine = BookingEngine::new(seeded.dyn_store());

    let result = engine.book(&request("+5215550000004", seeded.event.id, "2025-06-04")).await;
    assert_matches!(result, Err(AppointmentError::DateOutOfRange { .. }));

    let rows = seeded.store.list_appointments_by_event(seeded.event.id).await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_patient_survives_a_rejected_booking() {
    let seeded = SeededStore::new().await.unwrap();
    let engine = BookingEngine::new(seeded.dyn_store());

    let result = engine.book(&request("+5215550000005", seeded.event.id, "someday")).await;
    assert_matches!(result, Err(AppointmentError::InvalidDate(_)));

    let patient = seeded.store.find_patient_by_phone("+5215550000005").await.unwrap();
    assert!(patient.is_some());
}

#[tokio::test]
async fn test_unknown_event_id_is_rejected() {
    let seeded = SeededStore::new().await.unwrap();
    let engine = BookingEngine::new(seeded.dyn_store());
    let missing = uuid::Uuid::new_v4();

    let result = engine.book(&request("+5215550000006", missing, "2025-06-01")).await;
    assert_matches!(result, Err(AppointmentError::EventNotFound(id)) if id == missing);
}

#[tokio::test]
async fn test_event_hints_resolve_by_label_date_or_id() {
    let seeded = SeededStore::new().await.unwrap();
    let other = seeded
        .add_event("Parque El Llano", "2025-06-10", "2025-06-12", 5)
        .await
        .unwrap();
    let engine = BookingEngine::new(seeded.dyn_store());

    let by_label = engine.resolve_event_hint("reforma", Some("Oaxaca"), None).await.unwrap();
    assert_eq!(by_label, seeded.event.id);

    let by_date = engine
        .resolve_event_hint("the one in the park", Some("Oaxaca"), Some("2025-06-11"))
        .await
        .unwrap();
    assert_eq!(by_date, other.id);

    let by_id = engine
        .resolve_event_hint(&other.id.to_string(), None, None)
        .await
        .unwrap();
    assert_eq!(by_id, other.id);

    let unknown = engine.resolve_event_hint("stadium", Some("Oaxaca"), Some("2025-08-01")).await;
    assert_matches!(unknown, Err(AppointmentError::UnknownEvent(_)));
}

#[tokio::test]
async fn test_capacity_ledger_reports_remaining_seats() {
    let seeded = SeededStore::new().await.unwrap();
    let engine = BookingEngine::new(seeded.dyn_store());
    let ledger = CapacityLedger::new(seeded.dyn_store());

    engine.book(&request("+5215550000007", seeded.event.id, "2025-06-01")).await.unwrap();

    assert_eq!(ledger.count_active(seeded.event.id, date("2025-06-01")).await.unwrap(), 1);
    assert_eq!(ledger.remaining(seeded.event.id, date("2025-06-01")).await.unwrap(), 1);
    assert_eq!(ledger.remaining(seeded.event.id, date("2025-06-09")).await.unwrap(), 0);
    assert_matches!(
        ledger.count_active(uuid::Uuid::new_v4(), date("2025-06-01")).await,
        Err(AppointmentError::EventNotFound(_))
    );

    let booked = seeded.store.list_appointments_by_event(seeded.event.id).await.unwrap();
    assert_eq!(booked[0].status, AppointmentStatus::Scheduled);
    assert!(!booked[0].reminder_sent);
}
