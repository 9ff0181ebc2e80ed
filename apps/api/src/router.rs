use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use calendar_sync_cell::{create_calendar_sync_router, CalendarSyncState, GoogleCalendarClient};
use scheduling_cell::{
    create_scheduling_router, SchedulingState, SupabaseEpisodeCacheRefresher, SupabaseSchedulingStore,
};
use shared_config::AppConfig;
use shared_database::SupabaseClient;

pub fn create_router(config: Arc<AppConfig>) -> Router {
    let supabase = Arc::new(SupabaseClient::new(&config));
    let store = Arc::new(SupabaseSchedulingStore::new(supabase.clone(), &config));
    let refresher = Arc::new(SupabaseEpisodeCacheRefresher::new(supabase, &config));
    let calendar = Arc::new(GoogleCalendarClient::new(&config));

    let scheduling_state = Arc::new(SchedulingState {
        config: config.clone(),
        store: store.clone(),
        refresher,
    });
    let calendar_sync_state = Arc::new(CalendarSyncState {
        config,
        store,
        calendar,
    });

    Router::new()
        .route("/", get(|| async { "Scheduling API is running!" }))
        .nest("/scheduling", create_scheduling_router(scheduling_state))
        .nest("/calendar-sync", create_calendar_sync_router(calendar_sync_state))
}
