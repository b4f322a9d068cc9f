// libs/messaging-cell/src/services/whatsapp.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, info};

use shared_config::AppConfig;

use crate::models::{OutboundMessage, SendError, SendReceipt, SendResponse};
use crate::services::sender::MessageSender;

/// WhatsApp Cloud API client.
/// POST {base_url}/{phone_number_id}/messages
#[derive(Debug)]
pub struct WhatsAppClient {
    client: Client,
    base_url: String,
    phone_number_id: String,
    access_token: String,
    timeout: Duration,
}

impl WhatsAppClient {
    pub fn new(config: &AppConfig) -> Result<Self, SendError> {
        if !config.is_messaging_configured() {
            return Err(SendError::NotConfigured);
        }

        Ok(Self {
            client: Client::new(),
            base_url: config.whatsapp_api_base_url.trim_end_matches('/').to_string(),
            phone_number_id: config.whatsapp_phone_number_id.clone(),
            access_token: config.whatsapp_access_token.clone(),
            timeout: config.upstream_timeout(),
        })
    }

    async fn post(&self, message: &OutboundMessage) -> Result<SendReceipt, SendError> {
        let url = format!("{}/{}/messages", self.base_url, self.phone_number_id);
        debug!("Sending {} message to {} via {}", message.message_type, message.to, url);

        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .json(message)
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| SendError::Timeout(self.timeout.as_secs()))??;

        let status = response.status();
        let response_text = tokio::time::timeout(self.timeout, response.text())
            .await
            .map_err(|_| SendError::Timeout(self.timeout.as_secs()))??;

        if !status.is_success() {
            error!("WhatsApp send to {} failed: {} - {}", message.to, status, response_text);
            return Err(SendError::Http {
                status: status.as_u16(),
                body: response_text,
            });
        }

        let message_id = serde_json::from_str::<SendResponse>(&response_text)
            .ok()
            .and_then(|parsed| parsed.messages.into_iter().next())
            .map(|sent| sent.id);

        info!("WhatsApp accepted {} message for {}", message.message_type, message.to);
        Ok(SendReceipt { message_id })
    }
}

#[async_trait]
impl MessageSender for WhatsAppClient {
    async fn send_text(&self, phone: &str, text: &str) -> Result<SendReceipt, SendError> {
        self.post(&OutboundMessage::text(phone, text)).await
    }

    async fn send_template(
        &self,
        phone: &str,
        template: &str,
        params: &[String],
        language: &str,
    ) -> Result<SendReceipt, SendError> {
        self.post(&OutboundMessage::template(phone, template, params, language))
            .await
    }
}
