// libs/messaging-cell/src/services/sender.rs
use async_trait::async_trait;

use crate::models::{SendError, SendReceipt};

/// Outbound message channel. Implementations bound every call with a
/// timeout and never retry internally; retry policy belongs to the caller.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_text(&self, phone: &str, text: &str) -> Result<SendReceipt, SendError>;

    async fn send_template(
        &self,
        phone: &str,
        template: &str,
        params: &[String],
        language: &str,
    ) -> Result<SendReceipt, SendError>;
}
