// libs/reminder-cell/src/router.rs
use std::sync::Arc;

use axum::{middleware, routing::post, Router};

use shared_config::AppConfig;
use shared_utils::extractor::admin_auth_middleware;

use crate::handlers;
use crate::services::ReminderDispatcher;

pub fn reminder_admin_routes(config: Arc<AppConfig>, dispatcher: Arc<ReminderDispatcher>) -> Router {
    Router::new()
        .route("/reminders/run", post(handlers::run_reminders))
        .layer(middleware::from_fn_with_state(config, admin_auth_middleware))
        .with_state(dispatcher)
}
