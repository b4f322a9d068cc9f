// libs/conversation-cell/src/services/history.rs
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use shared_database::{Store, StoreError};
use shared_models::Direction;

use crate::models::HistoryTurn;

/// Append-only log of the messages exchanged with each phone.
pub struct ConversationLog {
    store: Arc<dyn Store>,
    history_limit: i64,
}

impl ConversationLog {
    pub fn new(store: Arc<dyn Store>, history_limit: i64) -> Self {
        Self { store, history_limit }
    }

    pub async fn record(&self, phone: &str, direction: Direction, message: &str) -> Result<(), StoreError> {
        self.store.append_log(phone, direction, message, Utc::now()).await?;
        debug!("Logged {} message for {}", direction, phone);
        Ok(())
    }

    /// The most recent turns, oldest first.
    pub async fn history(&self, phone: &str) -> Result<Vec<HistoryTurn>, StoreError> {
        let entries = self.store.recent_log(phone, self.history_limit).await?;
        Ok(entries
            .into_iter()
            .map(|entry| HistoryTurn {
                direction: entry.direction,
                text: entry.message,
            })
            .collect())
    }
}
