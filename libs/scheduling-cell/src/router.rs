use std::sync::Arc;
use axum::{
    Router,
    routing::post,
};

use shared_config::AppConfig;

use crate::handlers::{
    process_events,
    run_hold_expiry,
    run_intent_expiry,
    run_priority_recompute,
};
use crate::services::store::{EpisodeCacheRefresher, SchedulingStore};

pub struct SchedulingState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn SchedulingStore>,
    pub refresher: Arc<dyn EpisodeCacheRefresher>,
}

/// Cron trigger endpoints for the scheduling jobs.
pub fn create_scheduling_router(state: Arc<SchedulingState>) -> Router {
    Router::new()
        .route("/jobs/priority-recompute", post(run_priority_recompute))
        .route("/jobs/hold-expiry", post(run_hold_expiry))
        .route("/jobs/intent-expiry", post(run_intent_expiry))
        .route("/jobs/process-events", post(process_events))
        .with_state(state)
}
