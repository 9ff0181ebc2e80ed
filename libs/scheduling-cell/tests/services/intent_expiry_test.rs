use assert_matches::assert_matches;
use chrono::Duration;

use scheduling_cell::*;

use super::{open_intent, store, test_config, test_now};

#[tokio::test]
async fn test_intent_past_window_grace_expires() {
    let store = store();
    // default grace is 48 hours
    let lapsed = open_intent(Duration::days(10), Some(Duration::hours(49)));
    let within_grace = open_intent(Duration::days(10), Some(Duration::hours(47)));
    store.insert_intent(lapsed.clone()).await;
    store.insert_intent(within_grace.clone()).await;

    let service = IntentExpiryService::new(store.clone(), test_config());
    let result = service.run_at(test_now()).await.expect("sweep should succeed");

    assert_eq!(result, IntentExpiryResult { expired: 1, errors: vec![] });
    assert_eq!(store.intent(lapsed.id).await.unwrap().state, IntentState::Expired);
    assert_eq!(store.intent(within_grace.id).await.unwrap().state, IntentState::Open);
}

#[tokio::test]
async fn test_intent_past_age_ceiling_expires_without_window() {
    let store = store();
    let ancient = open_intent(Duration::days(61), None);
    let young = open_intent(Duration::days(59), None);
    store.insert_intent(ancient.clone()).await;
    store.insert_intent(young.clone()).await;

    let service = IntentExpiryService::new(store.clone(), test_config());
    let result = service.run_at(test_now()).await.unwrap();

    assert_eq!(result.expired, 1);
    assert_eq!(store.intent(ancient.id).await.unwrap().state, IntentState::Expired);
    assert_eq!(store.intent(young.id).await.unwrap().state, IntentState::Open);
}

#[tokio::test]
async fn test_expiry_leaves_priority_and_closed_intents_alone() {
    let store = store();
    let mut lapsed = open_intent(Duration::days(70), None);
    lapsed.priority = 999;
    let mut cancelled = open_intent(Duration::days(70), None);
    cancelled.state = IntentState::Cancelled;
    store.insert_intent(lapsed.clone()).await;
    store.insert_intent(cancelled.clone()).await;

    let service = IntentExpiryService::new(store.clone(), test_config());
    service.run_at(test_now()).await.unwrap();

    let stored = store.intent(lapsed.id).await.unwrap();
    assert_eq!(stored.state, IntentState::Expired);
    assert_eq!(stored.priority, 999);
    assert_eq!(store.intent(cancelled.id).await.unwrap().state, IntentState::Cancelled);
}

#[tokio::test]
async fn test_intent_expiry_is_idempotent() {
    let store = store();
    store.insert_intent(open_intent(Duration::days(90), None)).await;
    store.insert_intent(open_intent(Duration::days(5), Some(Duration::days(4)))).await;

    let service = IntentExpiryService::new(store.clone(), test_config());
    let first = service.run_at(test_now()).await.unwrap();
    let second = service.run_at(test_now()).await.unwrap();

    assert_eq!(first.expired, 2);
    assert_eq!(second, IntentExpiryResult::default());
}

#[tokio::test]
async fn test_intent_failure_is_recorded_and_batch_continues() {
    let store = store();
    let broken = open_intent(Duration::days(80), None);
    let healthy = open_intent(Duration::days(75), None);
    store.insert_intent(broken.clone()).await;
    store.insert_intent(healthy.clone()).await;
    store.fail_updates_for(broken.id).await;

    let service = IntentExpiryService::new(store.clone(), test_config());
    let result = service.run_at(test_now()).await.unwrap();

    assert_eq!(result.expired, 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(store.intent(healthy.id).await.unwrap().state, IntentState::Expired);
    assert_eq!(store.intent(broken.id).await.unwrap().state, IntentState::Open);
}

#[tokio::test]
async fn test_intent_sweep_is_bounded_by_batch_size() {
    let store = store();
    for day in 0..5 {
        store.insert_intent(open_intent(Duration::days(100 + day), None)).await;
    }

    let config = shared_config::SchedulingConfig {
        batch_size: 2,
        ..test_config()
    };
    let service = IntentExpiryService::new(store.clone(), config);

    assert_eq!(service.run_at(test_now()).await.unwrap().expired, 2);
    assert_eq!(service.run_at(test_now()).await.unwrap().expired, 2);
    assert_eq!(service.run_at(test_now()).await.unwrap().expired, 1);
}

#[tokio::test]
async fn test_intent_sweep_propagates_outage() {
    let store = store();
    store.set_unavailable(true).await;

    let service = IntentExpiryService::new(store.clone(), test_config());
    assert_matches!(
        service.run_at(test_now()).await,
        Err(SchedulingError::StoreUnavailable(_))
    );
}
