// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch},
    Router,
};

use shared_config::AppConfig;
use shared_database::Store;
use shared_utils::extractor::admin_auth_middleware;

use crate::handlers;

/// Administrative appointment routes. Every route requires the admin token.
pub fn appointment_admin_routes(config: Arc<AppConfig>, store: Arc<dyn Store>) -> Router {
    Router::new()
        .route("/events/{event_id}/appointments", get(handlers::list_event_appointments))
        .route("/events/{event_id}/capacity", get(handlers::get_event_capacity))
        .route(
            "/appointments/{appointment_id}",
            patch(handlers::update_appointment_status).delete(handlers::delete_appointment),
        )
        .layer(middleware::from_fn_with_state(config, admin_auth_middleware))
        .with_state(store)
}
