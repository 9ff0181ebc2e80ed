use std::sync::Arc;
use axum::{
    extract::State,
    response::Json,
};
use serde_json::{json, Value};
use tracing::{error, info};

use shared_models::error::AppError;

use crate::{
    router::CalendarSyncState,
    services::reconciliation::ReconciliationEngine,
};

/// Reconcile every active Google Calendar connection against offered slots
pub async fn run_google_reconciliation(
    State(state): State<Arc<CalendarSyncState>>,
) -> Result<Json<Value>, AppError> {
    info!("Google Calendar reconciliation triggered");

    let engine = ReconciliationEngine::new(
        state.store.clone(),
        state.calendar.clone(),
        state.config.scheduling.clone(),
    );

    let reports = engine.run_google_reconciliation().await.map_err(|e| {
        error!("Google Calendar reconciliation failed: {}", e);
        AppError::from(e)
    })?;

    let success = reports.iter().all(|report| report.errors.is_empty());
    let blocks_applied: usize = reports.iter().map(|report| report.blocks_applied).sum();

    Ok(Json(json!({
        "success": success,
        "users": reports.len(),
        "blocks_applied": blocks_applied,
        "reports": reports
    })))
}
