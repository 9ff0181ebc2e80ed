use std::sync::Arc;
use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use shared_models::error::AppError;

use crate::{
    router::SchedulingState,
    services::{
        cache_refresh::CacheRefreshWorker,
        hold_expiry::HoldExpiryService,
        intent_expiry::IntentExpiryService,
        recompute::PriorityRecomputeService,
    },
};

#[derive(Debug, Deserialize)]
pub struct ProcessEventsQuery {
    pub batch_size: Option<usize>,
}

/// Recompute and persist priorities of open intents
pub async fn run_priority_recompute(
    State(state): State<Arc<SchedulingState>>,
) -> Result<Json<Value>, AppError> {
    info!("Priority recompute triggered");

    let service = PriorityRecomputeService::new(state.store.clone(), state.config.scheduling.clone());
    let result = service.run().await.map_err(|e| {
        error!("Priority recompute failed: {}", e);
        AppError::from(e)
    })?;

    Ok(Json(json!({
        "success": result.errors.is_empty(),
        "scanned": result.scanned,
        "updated": result.updated,
        "starved": result.starved,
        "errors": result.errors
    })))
}

/// Expire lapsed holds and release their slots
pub async fn run_hold_expiry(
    State(state): State<Arc<SchedulingState>>,
) -> Result<Json<Value>, AppError> {
    info!("Hold expiry triggered");

    let service = HoldExpiryService::new(state.store.clone(), state.config.scheduling.clone());
    let result = service.run().await.map_err(|e| {
        error!("Hold expiry failed: {}", e);
        AppError::from(e)
    })?;

    Ok(Json(json!({
        "success": result.errors.is_empty(),
        "expired": result.expired,
        "released": result.released,
        "errors": result.errors
    })))
}

/// Expire open intents past their window grace or age ceiling
pub async fn run_intent_expiry(
    State(state): State<Arc<SchedulingState>>,
) -> Result<Json<Value>, AppError> {
    info!("Intent expiry triggered");

    let service = IntentExpiryService::new(state.store.clone(), state.config.scheduling.clone());
    let result = service.run().await.map_err(|e| {
        error!("Intent expiry failed: {}", e);
        AppError::from(e)
    })?;

    Ok(Json(json!({
        "success": result.errors.is_empty(),
        "expired": result.expired,
        "errors": result.errors
    })))
}

/// Drain one batch of scheduling events
pub async fn process_events(
    State(state): State<Arc<SchedulingState>>,
    Query(query): Query<ProcessEventsQuery>,
) -> Result<Json<Value>, AppError> {
    let batch_size = query.batch_size.unwrap_or(state.config.scheduling.batch_size);
    if batch_size == 0 || batch_size > 500 {
        return Err(AppError::BadRequest("batch_size must be between 1 and 500".to_string()));
    }
    info!("Event processing triggered with batch size {}", batch_size);

    let worker = CacheRefreshWorker::new(state.store.clone(), state.refresher.clone());
    let result = worker.process_events_batch(batch_size).await.map_err(|e| {
        error!("Event processing failed: {}", e);
        AppError::from(e)
    })?;

    Ok(Json(json!({
        "success": result.failed == 0,
        "processed": result.processed,
        "episodes_refreshed": result.episodes_refreshed,
        "failed": result.failed
    })))
}
