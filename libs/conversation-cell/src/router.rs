// libs/conversation-cell/src/router.rs
use std::sync::Arc;

use axum::{routing::get, Router};

use shared_config::AppConfig;

use crate::handlers;
use crate::services::InboundService;

#[derive(Clone)]
pub struct WebhookState {
    pub config: Arc<AppConfig>,
    pub inbound: Arc<InboundService>,
}

pub fn webhook_routes(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook", get(handlers::verify_webhook).post(handlers::receive_webhook))
        .with_state(state)
}
