use std::sync::Arc;
use axum::{
    Router,
    routing::post,
};

use scheduling_cell::SchedulingStore;
use shared_config::AppConfig;

use crate::handlers::run_google_reconciliation;
use crate::services::google::CalendarApi;

pub struct CalendarSyncState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn SchedulingStore>,
    pub calendar: Arc<dyn CalendarApi>,
}

pub fn create_calendar_sync_router(state: Arc<CalendarSyncState>) -> Router {
    Router::new()
        .route("/jobs/google-reconciliation", post(run_google_reconciliation))
        .with_state(state)
}
