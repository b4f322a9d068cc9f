// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_database::Store;
use shared_models::error::AppError;

use crate::models::{CapacityQuery, UpdateAppointmentStatusRequest};
use crate::services::{parse_appointment_date, AppointmentAdminService, CapacityLedger};

// ==============================================================================
// ADMINISTRATIVE APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_event_appointments(
    State(store): State<Arc<dyn Store>>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentAdminService::new(store);
    let appointments = service.list_by_event(event_id).await?;

    Ok(Json(json!({
        "event_id": event_id,
        "total": appointments.len(),
        "appointments": appointments,
    })))
}

#[axum::debug_handler]
pub async fn get_event_capacity(
    State(store): State<Arc<dyn Store>>,
    Path(event_id): Path<Uuid>,
    Query(query): Query<CapacityQuery>,
) -> Result<Json<Value>, AppError> {
    let ledger = CapacityLedger::new(store);
    let capacity = ledger.capacity_of(event_id).await?;

    let Some(raw_date) = query.date else {
        return Ok(Json(json!({ "capacity": capacity })));
    };

    let date = parse_appointment_date(&raw_date)?;
    let active = ledger.count_active(event_id, date).await?;
    let remaining = ledger.remaining(event_id, date).await?;

    Ok(Json(json!({
        "capacity": capacity,
        "date": date,
        "active": active,
        "remaining": remaining,
    })))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(store): State<Arc<dyn Store>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateAppointmentStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentAdminService::new(store);
    let appointment = service.update_status(appointment_id, request.status).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(store): State<Arc<dyn Store>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    AppointmentAdminService::new(store).delete(appointment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
