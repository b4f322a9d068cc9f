// libs/reminder-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};

use shared_models::error::AppError;

use crate::models::{DispatchError, DispatchReport, RunQuery};
use crate::services::ReminderDispatcher;

/// Manual trigger. Without `date` the run targets `today + lead_days`.
#[axum::debug_handler]
pub async fn run_reminders(
    State(dispatcher): State<Arc<ReminderDispatcher>>,
    Query(query): Query<RunQuery>,
) -> Result<Json<DispatchReport>, AppError> {
    let target_date = match query.date.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| DispatchError::InvalidDate(raw.to_string()))?,
        _ => dispatcher.settings().target_date_for(Utc::now().date_naive())?,
    };

    let report = dispatcher.run_once(target_date).await?;
    Ok(Json(report))
}
