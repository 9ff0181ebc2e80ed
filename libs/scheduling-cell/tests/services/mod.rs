use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use scheduling_cell::*;
use shared_config::SchedulingConfig;

mod intent_expiry_test;
mod router_test;
mod supabase_store_test;

pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap()
}

pub fn test_config() -> SchedulingConfig {
    SchedulingConfig::default()
}

pub fn open_intent(age: Duration, window_end_ago: Option<Duration>) -> Intent {
    let now = test_now();
    Intent::new(now - age, window_end_ago.map(|ago| now - ago))
}

pub fn slot(doctor_id: Uuid, start: DateTime<Utc>, status: SlotStatus) -> TimeSlot {
    TimeSlot {
        id: Uuid::new_v4(),
        doctor_id,
        start_time: start,
        duration_minutes: Some(30),
        status,
        external_event_id: None,
    }
}

pub fn hold_on(slot_id: Uuid, expires_at: DateTime<Utc>, created_at: DateTime<Utc>) -> Hold {
    Hold {
        id: Uuid::new_v4(),
        slot_id,
        expires_at,
        state: HoldState::Active,
        created_at,
    }
}

/// Records refresh calls; episodes in `failing` return an error.
#[derive(Default)]
pub struct RecordingRefresher {
    pub calls: Mutex<Vec<(&'static str, Uuid)>>,
    pub failing: Mutex<HashSet<Uuid>>,
}

impl RecordingRefresher {
    pub async fn fail_for(&self, episode_id: Uuid) {
        self.failing.lock().await.insert(episode_id);
    }

    pub async fn calls_for(&self, kind: &str) -> Vec<Uuid> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, id)| *id)
            .collect()
    }

    async fn record(&self, kind: &'static str, episode_id: Uuid) -> Result<(), SchedulingError> {
        self.calls.lock().await.push((kind, episode_id));
        if self.failing.lock().await.contains(&episode_id) {
            return Err(SchedulingError::CacheRefresh {
                episode_id,
                message: "recompute function raised".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EpisodeCacheRefresher for RecordingRefresher {
    async fn refresh_next_step(&self, episode_id: Uuid) -> Result<(), SchedulingError> {
        self.record("next_step", episode_id).await
    }

    async fn refresh_forecast(&self, episode_id: Uuid) -> Result<(), SchedulingError> {
        self.record("forecast", episode_id).await
    }
}

pub fn store() -> Arc<InMemorySchedulingStore> {
    Arc::new(InMemorySchedulingStore::new())
}
