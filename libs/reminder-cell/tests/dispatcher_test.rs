mod common;

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use common::{book, settings, FakeSender};
use reminder_cell::ReminderDispatcher;
use shared_database::Store;
use shared_models::{AppointmentStatus, Direction};
use shared_utils::test_utils::{date, SeededStore};

const ANA: &str = "5215550001";
const LUIS: &str = "5215550002";

#[tokio::test]
async fn test_stale_contact_without_template_is_skipped_then_sent_by_template() {
    let seeded = SeededStore::new().await.unwrap();
    let booked = book(&seeded, ANA, "Ana", "2025-06-01").await;
    let now = Utc.with_ymd_and_hms(2025, 5, 31, 12, 0, 0).unwrap();
    seeded
        .store
        .append_log(ANA, Direction::In, "hola", now - Duration::hours(30))
        .await
        .unwrap();

    let sender = Arc::new(FakeSender::default());
    let without_template = ReminderDispatcher::new(seeded.dyn_store(), sender.clone(), settings(None));
    let report = without_template.run_once_at(date("2025-06-01"), now).await.unwrap();

    assert_eq!(report.due, 1);
    assert_eq!(report.skipped_no_template, 1);
    assert_eq!(report.sent(), 0);
    assert_eq!(sender.sent_count(), 0);
    let row = seeded.store.get_appointment(booked.appointment_id).await.unwrap().unwrap();
    assert!(!row.reminder_sent);

    let with_template = ReminderDispatcher::new(
        seeded.dyn_store(),
        sender.clone(),
        settings(Some("appointment_reminder")),
    );
    let report = with_template.run_once_at(date("2025-06-01"), now).await.unwrap();

    assert_eq!(report.sent_template, 1);
    assert_eq!(report.sent_freeform, 0);
    let templates = sender.templates.lock().unwrap().clone();
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0].phone, ANA);
    assert_eq!(templates[0].template, "appointment_reminder");
    assert_eq!(templates[0].language, "es");
    assert_eq!(templates[0].params[0], "Ana");

    let row = seeded.store.get_appointment(booked.appointment_id).await.unwrap().unwrap();
    assert!(row.reminder_sent);
    assert!(row.reminder_sent_at.is_some());

    let report = with_template.run_once_at(date("2025-06-01"), now).await.unwrap();
    assert_eq!(report.due, 0);
}

#[tokio::test]
async fn test_recent_contact_gets_a_freeform_message() {
    let seeded = SeededStore::new().await.unwrap();
    let booked = book(&seeded, ANA, "Ana", "2025-06-01").await;
    let now = Utc.with_ymd_and_hms(2025, 5, 31, 12, 0, 0).unwrap();
    seeded
        .store
        .append_log(ANA, Direction::In, "gracias", now - Duration::hours(2))
        .await
        .unwrap();

    let sender = Arc::new(FakeSender::default());
    let dispatcher = ReminderDispatcher::new(seeded.dyn_store(), sender.clone(), settings(None));
    let report = dispatcher.run_once_at(date("2025-06-01"), now).await.unwrap();

    assert_eq!(report.sent_freeform, 1);
    let texts = sender.texts.lock().unwrap().clone();
    assert_eq!(texts[0].0, ANA);
    assert!(texts[0].1.contains("Centro de Salud Reforma"));

    let row = seeded.store.get_appointment(booked.appointment_id).await.unwrap().unwrap();
    assert!(row.reminder_sent);

    let log = seeded.store.recent_log(ANA, 10).await.unwrap();
    assert_eq!(log.last().unwrap().direction, Direction::Out);
}

#[tokio::test]
async fn test_send_failure_leaves_flag_unset_and_does_not_stop_the_batch() {
    let seeded = SeededStore::new().await.unwrap();
    let ana = book(&seeded, ANA, "Ana", "2025-06-02").await;
    let luis = book(&seeded, LUIS, "Luis", "2025-06-02").await;
    let now = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();

    let sender = Arc::new(FakeSender::default());
    sender.fail_for(ANA);
    let dispatcher = ReminderDispatcher::new(
        seeded.dyn_store(),
        sender.clone(),
        settings(Some("appointment_reminder")),
    );

    let report = dispatcher.run_once_at(date("2025-06-02"), now).await.unwrap();
    assert_eq!(report.due, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.sent_template, 1);

    let ana_row = seeded.store.get_appointment(ana.appointment_id).await.unwrap().unwrap();
    let luis_row = seeded.store.get_appointment(luis.appointment_id).await.unwrap().unwrap();
    assert!(!ana_row.reminder_sent);
    assert!(luis_row.reminder_sent);

    sender.recover();
    let report = dispatcher.run_once_at(date("2025-06-02"), now).await.unwrap();
    assert_eq!(report.due, 1);
    assert_eq!(report.sent_template, 1);
    let ana_row = seeded.store.get_appointment(ana.appointment_id).await.unwrap().unwrap();
    assert!(ana_row.reminder_sent);
}

#[tokio::test]
async fn test_concurrent_mark_is_reported_as_anomaly() {
    let seeded = SeededStore::new().await.unwrap();
    let booked = book(&seeded, ANA, "Ana", "2025-06-03").await;
    let now = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();

    let sender = Arc::new(FakeSender::default());
    *sender.race_with.lock().unwrap() = Some((seeded.dyn_store(), booked.appointment_id));
    let dispatcher = ReminderDispatcher::new(
        seeded.dyn_store(),
        sender.clone(),
        settings(Some("appointment_reminder")),
    );

    let report = dispatcher.run_once_at(date("2025-06-03"), now).await.unwrap();
    assert_eq!(report.sent_template, 1);
    assert_eq!(report.mark_anomalies, 1);
}

#[tokio::test]
async fn test_cancelled_appointments_are_not_reminded() {
    let seeded = SeededStore::new().await.unwrap();
    let booked = book(&seeded, ANA, "Ana", "2025-06-01").await;
    appointment_cell::AppointmentAdminService::new(seeded.dyn_store())
        .update_status(booked.appointment_id, AppointmentStatus::Cancelled)
        .await
        .unwrap();

    let sender = Arc::new(FakeSender::default());
    let dispatcher = ReminderDispatcher::new(
        seeded.dyn_store(),
        sender.clone(),
        settings(Some("appointment_reminder")),
    );
    let report = dispatcher.run_once(date("2025-06-01")).await.unwrap();

    assert_eq!(report.due, 0);
    assert_eq!(sender.sent_count(), 0);
}
