#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use conversation_cell::{BookingProposal, HistoryTurn, InboundService, NluClient, NluError, NluReply};
use messaging_cell::{MessageSender, SendError, SendReceipt};
use shared_config::AppConfig;
use shared_database::Store;

/// Language collaborator that plays back queued replies. `None` in the
/// queue stands for an upstream failure.
#[derive(Default)]
pub struct ScriptedNlu {
    replies: Mutex<VecDeque<Option<NluReply>>>,
    pub calls: Mutex<Vec<(String, Vec<HistoryTurn>)>>,
}

impl ScriptedNlu {
    pub fn push_reply(&self, text: &str) {
        self.replies.lock().unwrap().push_back(Some(NluReply {
            reply_text: text.to_string(),
            booking_proposal: None,
            metadata: None,
        }));
    }

    pub fn push_proposal(&self, text: &str, proposal: BookingProposal) {
        self.replies.lock().unwrap().push_back(Some(NluReply {
            reply_text: text.to_string(),
            booking_proposal: Some(proposal),
            metadata: None,
        }));
    }

    pub fn push_failure(&self) {
        self.replies.lock().unwrap().push_back(None);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl NluClient for ScriptedNlu {
    async fn converse(
        &self,
        _phone: &str,
        message: &str,
        history: &[HistoryTurn],
        _metadata: &Value,
    ) -> Result<NluReply, NluError> {
        self.calls
            .lock()
            .unwrap()
            .push((message.to_string(), history.to_vec()));
        match self.replies.lock().unwrap().pop_front() {
            Some(Some(reply)) => Ok(reply),
            Some(None) => Err(NluError::Http {
                status: 503,
                body: "unavailable".to_string(),
            }),
            None => Ok(NluReply {
                reply_text: "ok".to_string(),
                booking_proposal: None,
                metadata: None,
            }),
        }
    }
}

#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: AtomicBool,
}

impl RecordingSender {
    pub fn texts_to(&self, phone: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to == phone)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send_text(&self, phone: &str, text: &str) -> Result<SendReceipt, SendError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SendError::Timeout(2));
        }
        self.sent.lock().unwrap().push((phone.to_string(), text.to_string()));
        Ok(SendReceipt { message_id: None })
    }

    async fn send_template(
        &self,
        phone: &str,
        template: &str,
        _params: &[String],
        _language: &str,
    ) -> Result<SendReceipt, SendError> {
        self.send_text(phone, template).await
    }
}

pub fn inbound_service(
    config: &AppConfig,
    store: Arc<dyn Store>,
    nlu: Arc<ScriptedNlu>,
    sender: Arc<RecordingSender>,
) -> InboundService {
    InboundService::new(config, store, nlu, sender)
}

pub fn proposal(event_hint: &str, date: &str) -> BookingProposal {
    BookingProposal {
        name: Some("Ana".to_string()),
        reason: Some("vision check".to_string()),
        city: Some("Oaxaca".to_string()),
        neighborhood: Some("Centro".to_string()),
        event_hint: event_hint.to_string(),
        date: date.to_string(),
    }
}
