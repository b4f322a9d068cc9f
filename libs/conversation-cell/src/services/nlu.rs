// libs/conversation-cell/src/services/nlu.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::models::{ConverseRequest, HistoryTurn, NluError, NluReply};

/// Language-understanding collaborator: turns the current message plus
/// recent history into a reply and, when the patient has given enough
/// detail, a booking proposal.
#[async_trait]
pub trait NluClient: Send + Sync {
    async fn converse(
        &self,
        phone: &str,
        message: &str,
        history: &[HistoryTurn],
        metadata: &Value,
    ) -> Result<NluReply, NluError>;
}

/// POST {base_url}/converse
#[derive(Debug)]
pub struct HttpNluClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl HttpNluClient {
    pub fn new(config: &AppConfig) -> Result<Self, NluError> {
        if !config.is_nlu_configured() {
            return Err(NluError::NotConfigured);
        }

        Ok(Self {
            client: Client::new(),
            base_url: config.nlu_base_url.trim_end_matches('/').to_string(),
            api_key: config.nlu_api_key.clone(),
            timeout: config.upstream_timeout(),
        })
    }
}

#[async_trait]
impl NluClient for HttpNluClient {
    async fn converse(
        &self,
        phone: &str,
        message: &str,
        history: &[HistoryTurn],
        metadata: &Value,
    ) -> Result<NluReply, NluError> {
        let url = format!("{}/converse", self.base_url);
        debug!("Asking {} about a message from {} with {} turns of history", url, phone, history.len());

        let body = ConverseRequest {
            phone,
            current_message: message,
            history,
            metadata,
        };

        let mut request = self.client.post(&url).json(&body);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| NluError::Timeout(self.timeout.as_secs()))??;

        let status = response.status();
        let response_text = tokio::time::timeout(self.timeout, response.text())
            .await
            .map_err(|_| NluError::Timeout(self.timeout.as_secs()))??;

        if !status.is_success() {
            error!("Language understanding failed: {} - {}", status, response_text);
            return Err(NluError::Http {
                status: status.as_u16(),
                body: response_text,
            });
        }

        serde_json::from_str(&response_text).map_err(|e| NluError::Decode(e.to_string()))
    }
}
