// libs/conversation-cell/src/services/inbound.rs
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use appointment_cell::{AppointmentError, BookingConfirmation, BookingEngine, BookingRequest};
use messaging_cell::MessageSender;
use patient_cell::normalize_phone;
use shared_config::AppConfig;
use shared_database::Store;
use shared_models::{Direction, ErrorKind, SessionStatus};

use crate::models::{BookingProposal, InboundError};
use crate::services::history::ConversationLog;
use crate::services::nlu::NluClient;
use crate::services::session::SessionService;

const GREETING: &str =
    "Hi! Let's start over. Tell me your name, your city and the day you would like to be seen.";
const TRY_AGAIN: &str = "Sorry, I'm having trouble right now. Please try again in a few minutes.";

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundOutcome {
    Ignored,
    Reset,
    Replied,
    Booked(BookingConfirmation),
    BookingRejected(ErrorKind),
    Unavailable,
}

/// Drives one inbound chat message through the session, the language
/// collaborator and, when a proposal comes back, the booking engine.
pub struct InboundService {
    sessions: SessionService,
    log: ConversationLog,
    booking: BookingEngine,
    nlu: Arc<dyn NluClient>,
    sender: Arc<dyn MessageSender>,
    reset_keywords: Vec<String>,
}

impl InboundService {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn Store>,
        nlu: Arc<dyn NluClient>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            sessions: SessionService::new(Arc::clone(&store), config.session_schema_version),
            log: ConversationLog::new(Arc::clone(&store), config.history_limit),
            booking: BookingEngine::new(store),
            nlu,
            sender,
            reset_keywords: config.reset_keywords.clone(),
        }
    }

    #[instrument(skip_all, fields(phone = %phone))]
    pub async fn handle_message(&self, phone: &str, text: &str) -> Result<InboundOutcome, InboundError> {
        let Some(phone) = normalize_phone(phone) else {
            warn!("Dropping inbound message without a sender");
            return Ok(InboundOutcome::Ignored);
        };
        let text = text.trim();
        if text.is_empty() {
            return Ok(InboundOutcome::Ignored);
        }

        let history = self.log.history(&phone).await?;
        self.log.record(&phone, Direction::In, text).await?;

        if self.is_reset_keyword(text) {
            self.sessions.reset(&phone).await?;
            self.sessions.create(&phone).await?;
            self.reply(&phone, GREETING).await?;
            return Ok(InboundOutcome::Reset);
        }

        let session = match self.sessions.get(&phone).await? {
            Some(session) if session.status == SessionStatus::Completed => self.sessions.restart(&phone).await?,
            Some(session) => session,
            None => self.sessions.create(&phone).await?,
        };

        let reply = match self.nlu.converse(&phone, text, &history, &session.metadata).await {
            Ok(reply) => reply,
            Err(err) => {
                error!("Language understanding failed for {}: {}", phone, err);
                self.reply(&phone, TRY_AGAIN).await?;
                return Ok(InboundOutcome::Unavailable);
            }
        };

        if let Some(metadata) = &reply.metadata {
            self.sessions.save_metadata(&phone, metadata).await?;
        }

        let Some(proposal) = &reply.booking_proposal else {
            self.reply(&phone, &reply.reply_text).await?;
            return Ok(InboundOutcome::Replied);
        };

        match self.book(&phone, proposal).await {
            Ok(confirmation) => {
                if let Err(e) = self.sessions.complete(&phone).await {
                    error!(
                        "Booking {} committed but session for {} was not completed: {}",
                        confirmation.appointment_id, phone, e
                    );
                }
                self.reply(&phone, &confirmation_message(&confirmation)).await?;
                Ok(InboundOutcome::Booked(confirmation))
            }
            Err(err) => {
                let kind = err.kind();
                let text = if kind.is_user_facing() {
                    info!("Booking proposal from {} declined: {}", phone, err);
                    err.user_message()
                } else {
                    error!("Booking for {} failed: {}", phone, err);
                    TRY_AGAIN.to_string()
                };
                self.reply(&phone, &text).await?;
                Ok(InboundOutcome::BookingRejected(kind))
            }
        }
    }

    fn is_reset_keyword(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.reset_keywords.iter().any(|keyword| *keyword == text)
    }

    async fn book(&self, phone: &str, proposal: &BookingProposal) -> Result<BookingConfirmation, AppointmentError> {
        let event_id = self
            .booking
            .resolve_event_hint(&proposal.event_hint, proposal.city.as_deref(), Some(&proposal.date))
            .await?;

        self.booking
            .book(&BookingRequest {
                phone: phone.to_string(),
                name: proposal.name.clone(),
                city: proposal.city.clone(),
                neighborhood: proposal.neighborhood.clone(),
                reason: proposal.reason.clone(),
                event_id,
                date: proposal.date.clone(),
            })
            .await
    }

    /// Sends `text` and logs it once the channel accepted it.
    async fn reply(&self, phone: &str, text: &str) -> Result<(), InboundError> {
        if text.trim().is_empty() {
            warn!("Skipping empty reply to {}", phone);
            return Ok(());
        }
        if let Err(err) = self.sender.send_text(phone, text).await {
            error!("Reply to {} was not delivered: {}", phone, err);
            return Err(err.into());
        }
        self.log.record(phone, Direction::Out, text).await?;
        Ok(())
    }
}

fn confirmation_message(confirmation: &BookingConfirmation) -> String {
    format!(
        "Your appointment is confirmed for {} at {}, {}. We'll send you a reminder before the day.",
        confirmation.date.format("%Y-%m-%d"),
        confirmation.location,
        confirmation.city_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    #[test]
    fn confirmation_names_date_and_place() {
        let text = confirmation_message(&BookingConfirmation {
            appointment_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            location: "Centro de Salud Reforma".to_string(),
            city_name: "Oaxaca".to_string(),
        });
        assert!(text.contains("2025-06-01"));
        assert!(text.contains("Centro de Salud Reforma, Oaxaca"));
    }
}
