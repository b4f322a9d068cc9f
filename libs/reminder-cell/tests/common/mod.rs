#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use appointment_cell::{BookingConfirmation, BookingEngine, BookingRequest};
use messaging_cell::{MessageSender, SendError, SendReceipt};
use reminder_cell::ReminderSettings;
use shared_database::Store;
use shared_utils::test_utils::SeededStore;

#[derive(Debug, Clone, PartialEq)]
pub struct SentTemplate {
    pub phone: String,
    pub template: String,
    pub params: Vec<String>,
    pub language: String,
}

/// Records every send. Phones in `failing` get a transport timeout;
/// `race_with` marks the given appointment as reminded during the send,
/// standing in for a concurrent dispatcher run.
#[derive(Default)]
pub struct FakeSender {
    pub texts: Mutex<Vec<(String, String)>>,
    pub templates: Mutex<Vec<SentTemplate>>,
    pub failing: Mutex<HashSet<String>>,
    pub race_with: Mutex<Option<(Arc<dyn Store>, Uuid)>>,
}

impl FakeSender {
    pub fn fail_for(&self, phone: &str) {
        self.failing.lock().unwrap().insert(phone.to_string());
    }

    pub fn recover(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn sent_count(&self) -> usize {
        self.texts.lock().unwrap().len() + self.templates.lock().unwrap().len()
    }

    async fn before_send(&self, phone: &str) -> Result<(), SendError> {
        if self.failing.lock().unwrap().contains(phone) {
            return Err(SendError::Timeout(2));
        }
        let race = self.race_with.lock().unwrap().take();
        if let Some((store, appointment_id)) = race {
            store.mark_reminder_sent(appointment_id, Utc::now()).await.unwrap();
        }
        Ok(())
    }
}

#[async_trait]
impl MessageSender for FakeSender {
    async fn send_text(&self, phone: &str, text: &str) -> Result<SendReceipt, SendError> {
        self.before_send(phone).await?;
        self.texts.lock().unwrap().push((phone.to_string(), text.to_string()));
        Ok(SendReceipt { message_id: None })
    }

    async fn send_template(
        &self,
        phone: &str,
        template: &str,
        params: &[String],
        language: &str,
    ) -> Result<SendReceipt, SendError> {
        self.before_send(phone).await?;
        self.templates.lock().unwrap().push(SentTemplate {
            phone: phone.to_string(),
            template: template.to_string(),
            params: params.to_vec(),
            language: language.to_string(),
        });
        Ok(SendReceipt { message_id: None })
    }
}

pub fn settings(template_name: Option<&str>) -> ReminderSettings {
    ReminderSettings {
        template_name: template_name.map(str::to_string),
        template_language: "es".to_string(),
        freeform_window: chrono::Duration::hours(24),
        lead_days: 1,
    }
}

pub async fn book(seeded: &SeededStore, phone: &str, name: &str, day: &str) -> BookingConfirmation {
    BookingEngine::new(seeded.dyn_store())
        .book(&BookingRequest {
            phone: phone.to_string(),
            name: Some(name.to_string()),
            city: None,
            neighborhood: None,
            reason: None,
            event_id: seeded.event.id,
            date: day.to_string(),
        })
        .await
        .unwrap()
}
