// libs/conversation-cell/src/models.rs
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use messaging_cell::SendError;
use shared_database::StoreError;
use shared_models::{Direction, ErrorKind};

// ==============================================================================
// LANGUAGE UNDERSTANDING COLLABORATOR
// ==============================================================================

/// One prior message handed to the collaborator, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryTurn {
    pub direction: Direction,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseRequest<'a> {
    pub phone: &'a str,
    pub current_message: &'a str,
    pub history: &'a [HistoryTurn],
    pub metadata: &'a Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NluReply {
    pub reply_text: String,
    #[serde(default)]
    pub booking_proposal: Option<BookingProposal>,
    /// Replacement for the session metadata, when the collaborator returns one.
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingProposal {
    pub name: Option<String>,
    pub reason: Option<String>,
    pub city: Option<String>,
    pub neighborhood: Option<String>,
    pub event_hint: String,
    pub date: String,
}

// ==============================================================================
// WHATSAPP WEBHOOK PAYLOADS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub value: WebhookValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookValue {
    #[serde(default)]
    pub messages: Vec<WebhookMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookMessage {
    pub from: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub text: Option<WebhookText>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookText {
    pub body: String,
}

impl WebhookPayload {
    /// `(from, body)` for every text message, in delivery order. Other
    /// message types are skipped.
    pub fn text_messages(&self) -> Vec<(String, String)> {
        self.entry
            .iter()
            .flat_map(|entry| entry.changes.iter())
            .flat_map(|change| change.value.messages.iter())
            .filter(|message| message.message_type == "text")
            .filter_map(|message| {
                message
                    .text
                    .as_ref()
                    .map(|text| (message.from.clone(), text.body.clone()))
            })
            .collect()
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session for {0} was created concurrently twice")]
    DuplicateCreate(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::DuplicateCreate(_) => ErrorKind::Conflict,
            SessionError::Store(e) => e.kind(),
        }
    }
}

#[derive(Debug, Error)]
pub enum NluError {
    #[error("Language understanding is not configured")]
    NotConfigured,

    #[error("Language understanding timed out after {0} seconds")]
    Timeout(u64),

    #[error("Language understanding returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Language understanding transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unreadable language understanding reply: {0}")]
    Decode(String),
}

impl NluError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::UpstreamFailure
    }
}

#[derive(Debug, Error)]
pub enum InboundError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Reply could not be delivered: {0}")]
    Send(#[from] SendError),
}

impl InboundError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InboundError::Session(e) => e.kind(),
            InboundError::Store(e) => e.kind(),
            InboundError::Send(e) => e.kind(),
        }
    }
}
