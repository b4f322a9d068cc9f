// libs/conversation-cell/src/services/session.rs
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use shared_database::{InsertOutcome, Store};
use shared_models::{ConversationSession, SessionStatus};

use crate::models::SessionError;

/// Per-phone conversation state. A missing row and a row written under a
/// different schema version both read as absent; the stale row is purged
/// on sight rather than migrated.
pub struct SessionService {
    store: Arc<dyn Store>,
    expected_version: i32,
}

impl SessionService {
    pub fn new(store: Arc<dyn Store>, expected_version: i32) -> Self {
        Self {
            store,
            expected_version,
        }
    }

    pub fn expected_version(&self) -> i32 {
        self.expected_version
    }

    pub async fn get(&self, phone: &str) -> Result<Option<ConversationSession>, SessionError> {
        let Some(session) = self.store.get_session(phone).await? else {
            return Ok(None);
        };

        if session.schema_version != self.expected_version {
            warn!(
                "Purging session for {} with schema version {} (expected {})",
                phone, session.schema_version, self.expected_version
            );
            self.store.delete_stale_session(phone, self.expected_version).await?;
            return Ok(None);
        }

        Ok(Some(session))
    }

    /// Inserts a fresh active session. A conflicting row is deleted and the
    /// insert retried once; a second conflict is reported, not retried.
    pub async fn create(&self, phone: &str) -> Result<ConversationSession, SessionError> {
        if let InsertOutcome::Inserted(session) = self.store.insert_session(phone, self.expected_version).await? {
            info!("Created session for {}", phone);
            return Ok(session);
        }

        warn!("Session for {} already exists, replacing it", phone);
        self.store.delete_session(phone).await?;

        match self.store.insert_session(phone, self.expected_version).await? {
            InsertOutcome::Inserted(session) => {
                info!("Created session for {} on retry", phone);
                Ok(session)
            }
            InsertOutcome::Conflict => Err(SessionError::DuplicateCreate(phone.to_string())),
        }
    }

    pub async fn get_or_create(&self, phone: &str) -> Result<ConversationSession, SessionError> {
        match self.get(phone).await? {
            Some(session) => Ok(session),
            None => self.create(phone).await,
        }
    }

    pub async fn reset(&self, phone: &str) -> Result<(), SessionError> {
        if self.store.delete_session(phone).await? {
            info!("Reset session for {}", phone);
        } else {
            debug!("Reset for {} found no session", phone);
        }
        Ok(())
    }

    pub async fn complete(&self, phone: &str) -> Result<(), SessionError> {
        if self.store.set_session_status(phone, SessionStatus::Completed).await? {
            info!("Session for {} completed", phone);
        }
        Ok(())
    }

    /// `completed -> active`. Creates a session if the row has gone.
    pub async fn restart(&self, phone: &str) -> Result<ConversationSession, SessionError> {
        if self.store.set_session_status(phone, SessionStatus::Active).await? {
            if let Some(session) = self.get(phone).await? {
                info!("Session for {} restarted", phone);
                return Ok(session);
            }
        }
        self.create(phone).await
    }

    pub async fn save_metadata(&self, phone: &str, metadata: &Value) -> Result<(), SessionError> {
        if !self.store.save_session_metadata(phone, metadata).await? {
            debug!("No session for {} to store metadata on", phone);
        }
        Ok(())
    }
}
