// libs/reminder-cell/src/services/dispatcher.rs
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, error, info, instrument, warn};

use messaging_cell::MessageSender;
use shared_database::Store;
use shared_models::{Direction, ReminderCandidate};

use crate::models::{DispatchError, DispatchReport, ReminderSettings};

enum Delivery {
    Freeform,
    Template,
}

/// Sends one reminder per scheduled appointment on a target date.
///
/// No lock is held across a send. The flag is set in its own statement
/// after the send returned, and only if it is still unset, so a failed
/// send is retried by the next run and a concurrent run is detected
/// rather than double-counted.
pub struct ReminderDispatcher {
    store: Arc<dyn Store>,
    sender: Arc<dyn MessageSender>,
    settings: ReminderSettings,
}

impl ReminderDispatcher {
    pub fn new(store: Arc<dyn Store>, sender: Arc<dyn MessageSender>, settings: ReminderSettings) -> Self {
        Self {
            store,
            sender,
            settings,
        }
    }

    pub fn settings(&self) -> &ReminderSettings {
        &self.settings
    }

    pub async fn run_once(&self, target_date: NaiveDate) -> Result<DispatchReport, DispatchError> {
        self.run_once_at(target_date, Utc::now()).await
    }

    #[instrument(skip(self))]
    pub async fn run_once_at(
        &self,
        target_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<DispatchReport, DispatchError> {
        let due = self.store.due_reminders(target_date).await?;
        info!("{} reminders due for {}", due.len(), target_date);

        let mut report = DispatchReport {
            target_date: Some(target_date),
            due: due.len(),
            ..DispatchReport::default()
        };

        for candidate in &due {
            self.dispatch(candidate, now, &mut report).await;
        }

        info!(
            "Reminder run for {} finished: {} freeform, {} template, {} skipped, {} failed, {} anomalies",
            target_date,
            report.sent_freeform,
            report.sent_template,
            report.skipped_no_template,
            report.failed,
            report.mark_anomalies
        );
        Ok(report)
    }

    async fn dispatch(&self, candidate: &ReminderCandidate, now: DateTime<Utc>, report: &mut DispatchReport) {
        let last_inbound = match self.store.last_inbound_at(&candidate.phone).await {
            Ok(last_inbound) => last_inbound,
            Err(e) => {
                error!("Could not read activity for appointment {}: {}", candidate.appointment_id, e);
                report.failed += 1;
                return;
            }
        };

        let within_window = last_inbound.is_some_and(|at| now - at <= self.settings.freeform_window);

        let (delivery, outcome, logged_text) = if within_window {
            let text = freeform_text(candidate);
            let outcome = self.sender.send_text(&candidate.phone, &text).await;
            (Delivery::Freeform, outcome, text)
        } else {
            let Some(template) = self.settings.template_name.as_deref() else {
                warn!(
                    "No reminder template configured; skipping appointment {} for {} outside the freeform window",
                    candidate.appointment_id, candidate.phone
                );
                report.skipped_no_template += 1;
                return;
            };
            let outcome = self
                .sender
                .send_template(
                    &candidate.phone,
                    template,
                    &template_params(candidate),
                    &self.settings.template_language,
                )
                .await;
            (Delivery::Template, outcome, format!("[template:{}]", template))
        };

        if let Err(e) = outcome {
            error!(
                "Reminder for appointment {} to {} failed ({}): {}",
                candidate.appointment_id,
                candidate.phone,
                e.kind(),
                e
            );
            report.failed += 1;
            return;
        }

        match delivery {
            Delivery::Freeform => report.sent_freeform += 1,
            Delivery::Template => report.sent_template += 1,
        }

        match self.store.mark_reminder_sent(candidate.appointment_id, Utc::now()).await {
            Ok(true) => debug!("Appointment {} marked as reminded", candidate.appointment_id),
            Ok(false) => {
                warn!(
                    "Appointment {} was already marked as reminded; a concurrent run may have sent a duplicate",
                    candidate.appointment_id
                );
                report.mark_anomalies += 1;
            }
            Err(e) => {
                error!(
                    "Reminder for appointment {} was sent but could not be recorded, the next run may resend it: {}",
                    candidate.appointment_id, e
                );
                report.mark_anomalies += 1;
            }
        }

        if let Err(e) = self
            .store
            .append_log(&candidate.phone, Direction::Out, &logged_text, Utc::now())
            .await
        {
            warn!("Could not log reminder for {}: {}", candidate.phone, e);
        }
    }
}

/// Template placeholder used when the patient never gave a name. The
/// platform rejects empty body parameters.
const UNNAMED_PATIENT: &str = "there";

fn known_name(candidate: &ReminderCandidate) -> Option<&str> {
    candidate
        .patient_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

fn freeform_text(candidate: &ReminderCandidate) -> String {
    let greeting = match known_name(candidate) {
        Some(name) => format!("Hi {}", name),
        None => "Hi".to_string(),
    };
    format!(
        "{}, this is a reminder of your appointment on {} at {}, {}. Reply here if you need to change anything.",
        greeting,
        candidate.appointment_date.format("%Y-%m-%d"),
        candidate.location,
        candidate.city_name
    )
}

/// Body placeholders: name, date, location, city.
fn template_params(candidate: &ReminderCandidate) -> Vec<String> {
    vec![
        known_name(candidate).unwrap_or(UNNAMED_PATIENT).to_string(),
        candidate.appointment_date.format("%Y-%m-%d").to_string(),
        candidate.location.clone(),
        candidate.city_name.clone(),
    ]
}
