use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use chrono::{Duration, Utc};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use scheduling_cell::*;
use shared_config::{AppConfig, SchedulingConfig};

use super::{hold_on, slot, RecordingRefresher};

fn state_with(store: Arc<InMemorySchedulingStore>) -> Arc<SchedulingState> {
    Arc::new(SchedulingState {
        config: Arc::new(AppConfig {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_role_key: String::new(),
            google_calendar_base_url: String::new(),
            port: 0,
            scheduling: SchedulingConfig::default(),
        }),
        store,
        refresher: Arc::new(RecordingRefresher::default()),
    })
}

async fn post(state: Arc<SchedulingState>, uri: &str) -> (StatusCode, Value) {
    let response = create_scheduling_router(state)
        .oneshot(Request::builder().method("POST").uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_hold_expiry_endpoint_reports_counts() {
    let store = Arc::new(InMemorySchedulingStore::new());
    let now = Utc::now();
    let held = slot(Uuid::new_v4(), now + Duration::days(1), SlotStatus::Held);
    store.insert_hold(hold_on(held.id, now - Duration::minutes(1), now - Duration::minutes(20))).await;
    store.insert_slot(held).await;

    let (status, body) = post(state_with(store), "/jobs/hold-expiry").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["expired"], 1);
    assert_eq!(body["released"], 1);
}

#[tokio::test]
async fn test_partial_failure_is_success_false_not_500() {
    let store = Arc::new(InMemorySchedulingStore::new());
    let broken = Intent::new(Utc::now() - Duration::days(100), None);
    store.insert_intent(broken.clone()).await;
    store.fail_updates_for(broken.id).await;

    let (status, body) = post(state_with(store), "/jobs/intent-expiry").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["errors"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_store_outage_maps_to_503() {
    let store = Arc::new(InMemorySchedulingStore::new());
    store.set_unavailable(true).await;

    let (status, body) = post(state_with(store), "/jobs/priority-recompute").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_process_events_rejects_zero_batch() {
    let store = Arc::new(InMemorySchedulingStore::new());

    let (status, _) = post(state_with(store.clone()), "/jobs/process-events?batch_size=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post(state_with(store), "/jobs/process-events").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["processed"], 0);
}
