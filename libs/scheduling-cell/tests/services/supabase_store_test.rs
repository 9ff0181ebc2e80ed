use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::Duration;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scheduling_cell::*;
use shared_config::{AppConfig, SchedulingConfig};
use shared_database::supabase::SupabaseClient;

use super::test_now;

fn test_app_config(server: &MockServer) -> AppConfig {
    AppConfig {
        supabase_url: server.uri(),
        supabase_anon_key: "test-anon-key".to_string(),
        supabase_service_role_key: "service-role-key".to_string(),
        google_calendar_base_url: String::new(),
        port: 0,
        scheduling: SchedulingConfig::default(),
    }
}

fn store_for(server: &MockServer) -> SupabaseSchedulingStore {
    let config = test_app_config(server);
    SupabaseSchedulingStore::new(Arc::new(SupabaseClient::new(&config)), &config)
}

#[tokio::test]
async fn test_lists_lapsed_holds_with_service_role() {
    let server = MockServer::start().await;
    let hold_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/slot_holds"))
        .and(query_param("state", "eq.active"))
        .and(query_param("limit", "50"))
        .and(header("authorization", "Bearer service-role-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": hold_id,
            "slot_id": slot_id,
            "expires_at": "2025-06-02T08:45:00Z",
            "state": "active",
            "created_at": "2025-06-02T08:30:00Z"
        }])))
        .mount(&server)
        .await;

    let holds = store_for(&server)
        .list_lapsed_holds(test_now(), 50)
        .await
        .expect("query should succeed");

    assert_eq!(holds.len(), 1);
    assert_eq!(holds[0].id, hold_id);
    assert_eq!(holds[0].slot_id, slot_id);
    assert_eq!(holds[0].state, HoldState::Active);
}

#[tokio::test]
async fn test_conditional_update_reports_whether_row_changed() {
    let server = MockServer::start().await;
    let applied = Uuid::new_v4();
    let raced = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/time_slots"))
        .and(query_param("id", format!("eq.{}", applied)))
        .and(query_param("status", "eq.held"))
        .and(header("prefer", "return=representation"))
        .and(body_partial_json(json!({ "status": "available" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": applied }])))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/time_slots"))
        .and(query_param("id", format!("eq.{}", raced)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let store = store_for(&server);
    assert!(store.transition_slot(applied, SlotStatus::Held, SlotStatus::Available).await.unwrap());
    assert!(!store.transition_slot(raced, SlotStatus::Held, SlotStatus::Available).await.unwrap());
}

#[tokio::test]
async fn test_disallowed_transition_never_reaches_the_store() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": Uuid::new_v4() }])))
        .expect(0)
        .mount(&server)
        .await;

    let store = store_for(&server);

    let err = store
        .transition_slot(Uuid::new_v4(), SlotStatus::Booked, SlotStatus::Available)
        .await
        .unwrap_err();
    assert_matches!(err, SchedulingError::InvalidTransition { entity: "slot", .. });
    assert!(!err.is_systemic());

    assert_matches!(
        store.transition_hold(Uuid::new_v4(), HoldState::Confirmed, HoldState::Expired).await,
        Err(SchedulingError::InvalidTransition { entity: "hold", .. })
    );
    assert_matches!(
        store.transition_intent(Uuid::new_v4(), IntentState::Expired, IntentState::Open).await,
        Err(SchedulingError::InvalidTransition { entity: "intent", .. })
    );
}

#[tokio::test]
async fn test_in_memory_store_refuses_to_release_booked_slot() {
    let store = super::store();
    let booked = super::slot(Uuid::new_v4(), test_now() + Duration::days(1), SlotStatus::Booked);
    store.insert_slot(booked.clone()).await;

    let err = store
        .transition_slot(booked.id, SlotStatus::Booked, SlotStatus::Available)
        .await
        .unwrap_err();

    assert_matches!(err, SchedulingError::InvalidTransition { entity: "slot", .. });
    assert_eq!(store.slot(booked.id).await.unwrap().status, SlotStatus::Booked);
}

#[tokio::test]
async fn test_server_errors_are_systemic_and_client_errors_are_not() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/scheduling_events"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/slot_intents"))
        .respond_with(ResponseTemplate::new(409).set_body_string("version mismatch"))
        .mount(&server)
        .await;

    let store = store_for(&server);

    let outage = store.list_unprocessed_events(10).await.unwrap_err();
    assert_matches!(outage, SchedulingError::StoreUnavailable(_));
    assert!(outage.is_systemic());

    let rejected = store
        .transition_intent(Uuid::new_v4(), IntentState::Open, IntentState::Expired)
        .await
        .unwrap_err();
    assert_matches!(rejected, SchedulingError::Store(_));
    assert!(!rejected.is_systemic());
}

#[tokio::test]
async fn test_unreachable_store_is_systemic() {
    let config = AppConfig {
        supabase_url: "http://127.0.0.1:9".to_string(),
        supabase_anon_key: "k".to_string(),
        supabase_service_role_key: "k".to_string(),
        google_calendar_base_url: String::new(),
        port: 0,
        scheduling: SchedulingConfig::default(),
    };
    let store = SupabaseSchedulingStore::new(Arc::new(SupabaseClient::new(&config)), &config);

    let err = store.list_calendar_connections("google").await.unwrap_err();
    assert!(err.is_systemic());
}

#[tokio::test]
async fn test_marks_events_processed_in_one_request() {
    let server = MockServer::start().await;
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/scheduling_events"))
        .and(query_param("id", format!("in.({},{})", first, second)))
        .and(query_param("processed_at", "is.null"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    store_for(&server)
        .mark_events_processed(&[first, second], test_now())
        .await
        .expect("update should succeed");
}

#[tokio::test]
async fn test_resolves_episode_through_appointment() {
    let server = MockServer::start().await;
    let appointment = Uuid::new_v4();
    let episode = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment)))
        .and(query_param("select", "episode_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "episode_id": episode }])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/episode_stage_changes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let store = store_for(&server);
    assert_eq!(store.episode_for_appointment(appointment).await.unwrap(), Some(episode));
    assert_eq!(store.episode_for_stage_change(Uuid::new_v4()).await.unwrap(), None);
}

#[tokio::test]
async fn test_expirable_intents_decode_optional_fields() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    let created = test_now() - Duration::days(90);

    Mock::given(method("GET"))
        .and(path("/rest/v1/slot_intents"))
        .and(query_param("state", "eq.open"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": id,
            "created_at": created.to_rfc3339(),
            "window_end": null,
            "priority": 998,
            "state": "open"
        }])))
        .mount(&server)
        .await;

    let intents = store_for(&server)
        .list_expirable_intents(test_now(), test_now() - Duration::days(60), 50)
        .await
        .unwrap();

    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].base_priority, 0);
    assert_eq!(intents[0].priority, 998);
    assert!(intents[0].window_end.is_none());
}

#[tokio::test]
async fn test_episode_refresher_calls_rpc_functions() {
    let server = MockServer::start().await;
    let episode = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/refresh_episode_next_step"))
        .and(body_partial_json(json!({ "p_episode_id": episode })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/refresh_episode_forecast"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let config = test_app_config(&server);
    let refresher = SupabaseEpisodeCacheRefresher::new(Arc::new(SupabaseClient::new(&config)), &config);

    refresher.refresh_next_step(episode).await.expect("next step refresh");
    let err = refresher.refresh_forecast(episode).await.unwrap_err();
    assert_matches!(err, SchedulingError::CacheRefresh { episode_id, .. } if episode_id == episode);
}
