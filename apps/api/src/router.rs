use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::appointment_admin_routes;
use conversation_cell::{webhook_routes, InboundService, WebhookState};
use reminder_cell::{reminder_admin_routes, ReminderDispatcher};
use shared_config::AppConfig;
use shared_database::Store;

pub struct AppServices {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub inbound: Arc<InboundService>,
    pub dispatcher: Arc<ReminderDispatcher>,
}

pub fn create_router(services: AppServices) -> Router {
    let admin = Router::new()
        .merge(appointment_admin_routes(services.config.clone(), services.store))
        .merge(reminder_admin_routes(services.config.clone(), services.dispatcher));

    Router::new()
        .route("/", get(|| async { "Outreach API is running!" }))
        .merge(webhook_routes(WebhookState {
            config: services.config,
            inbound: services.inbound,
        }))
        .nest("/admin", admin)
}
