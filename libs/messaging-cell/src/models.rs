// libs/messaging-cell/src/models.rs
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shared_models::ErrorKind;

// ==============================================================================
// WHATSAPP CLOUD API PAYLOADS
// ==============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    pub messaging_product: &'static str,
    pub to: String,
    #[serde(rename = "type")]
    pub message_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<TemplateBody>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextBody {
    pub body: String,
    pub preview_url: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateBody {
    pub name: String,
    pub language: TemplateLanguage,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<TemplateComponent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateLanguage {
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateComponent {
    #[serde(rename = "type")]
    pub component_type: &'static str,
    pub parameters: Vec<TemplateParameter>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateParameter {
    #[serde(rename = "type")]
    pub parameter_type: &'static str,
    pub text: String,
}

impl OutboundMessage {
    pub fn text(to: &str, body: &str) -> Self {
        Self {
            messaging_product: "whatsapp",
            to: to.to_string(),
            message_type: "text",
            text: Some(TextBody {
                body: body.to_string(),
                preview_url: false,
            }),
            template: None,
        }
    }

    /// Template parameters fill the body placeholders in order.
    pub fn template(to: &str, name: &str, params: &[String], language: &str) -> Self {
        let components = if params.is_empty() {
            Vec::new()
        } else {
            vec![TemplateComponent {
                component_type: "body",
                parameters: params
                    .iter()
                    .map(|value| TemplateParameter {
                        parameter_type: "text",
                        text: value.clone(),
                    })
                    .collect(),
            }]
        };

        Self {
            messaging_product: "whatsapp",
            to: to.to_string(),
            message_type: "template",
            text: None,
            template: Some(TemplateBody {
                name: name.to_string(),
                language: TemplateLanguage {
                    code: language.to_string(),
                },
                components,
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendResponse {
    #[serde(default)]
    pub messages: Vec<SentMessageId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentMessageId {
    pub id: String,
}

/// Identifier the platform assigned to an accepted message, when it returned one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: Option<String>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Error)]
pub enum SendError {
    #[error("Messaging is not configured")]
    NotConfigured,

    #[error("Send timed out after {0} seconds")]
    Timeout(u64),

    #[error("Messaging API returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Messaging transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl SendError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::UpstreamFailure
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_payload_shape() {
        let payload = serde_json::to_value(OutboundMessage::text("5215550001", "hola")).unwrap();
        assert_eq!(
            payload,
            json!({
                "messaging_product": "whatsapp",
                "to": "5215550001",
                "type": "text",
                "text": { "body": "hola", "preview_url": false }
            })
        );
    }

    #[test]
    fn template_without_params_has_no_components() {
        let payload =
            serde_json::to_value(OutboundMessage::template("5215550001", "appointment_reminder", &[], "es")).unwrap();
        assert_eq!(payload["template"]["language"]["code"], "es");
        assert!(payload["template"].get("components").is_none());
    }

    #[test]
    fn template_params_fill_the_body() {
        let params = vec!["Ana".to_string(), "2025-06-01".to_string()];
        let payload =
            serde_json::to_value(OutboundMessage::template("5215550001", "appointment_reminder", &params, "es")).unwrap();
        let parameters = &payload["template"]["components"][0]["parameters"];
        assert_eq!(parameters[0]["text"], "Ana");
        assert_eq!(parameters[1]["text"], "2025-06-01");
    }
}
