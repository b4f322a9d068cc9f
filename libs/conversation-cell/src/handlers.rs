// libs/conversation-cell/src/handlers.rs
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
};
use tracing::{debug, error, warn};

use shared_models::error::AppError;
use shared_utils::signature::{tokens_match, verify_signature, SIGNATURE_HEADER};

use crate::models::{VerifyQuery, WebhookPayload};
use crate::router::WebhookState;

// ==============================================================================
// WEBHOOK HANDLERS
// ==============================================================================

/// Subscription handshake: echoes `hub.challenge` back when the verify
/// token matches.
#[axum::debug_handler]
pub async fn verify_webhook(
    State(state): State<WebhookState>,
    Query(query): Query<VerifyQuery>,
) -> Result<String, AppError> {
    let token_matches = !state.config.webhook_verify_token.is_empty()
        && query
            .verify_token
            .as_deref()
            .is_some_and(|token| tokens_match(&state.config.webhook_verify_token, token));

    match (query.mode.as_deref(), query.challenge) {
        (Some("subscribe"), Some(challenge)) if token_matches => {
            debug!("Webhook subscription verified");
            Ok(challenge)
        }
        _ => {
            warn!("Rejected webhook verification attempt");
            Err(AppError::Forbidden("Webhook verification failed".to_string()))
        }
    }
}

/// Inbound messages. Always acknowledged once the signature checks out so
/// the platform does not redeliver; per-message failures are logged.
#[axum::debug_handler]
pub async fn receive_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    if state.config.webhook_app_secret.is_empty() {
        error!("WEBHOOK_APP_SECRET is not set, rejecting webhook delivery");
        return Err(AppError::Auth("Webhook signing secret is not configured".to_string()));
    }

    let signature = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());
    verify_signature(&state.config.webhook_app_secret, &body, signature).map_err(|e| {
        warn!("Webhook signature rejected: {:?}", e);
        AppError::Auth("Invalid webhook signature".to_string())
    })?;

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Ignoring unreadable webhook payload: {}", e);
            return Ok(StatusCode::OK);
        }
    };

    for (from, text) in payload.text_messages() {
        match state.inbound.handle_message(&from, &text).await {
            Ok(outcome) => debug!("Inbound message from {} handled: {:?}", from, outcome),
            Err(e) => error!("Inbound message from {} failed ({}): {}", from, e.kind(), e),
        }
    }

    Ok(StatusCode::OK)
}
