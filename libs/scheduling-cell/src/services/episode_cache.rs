use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Method,
};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::services::store::EpisodeCacheRefresher;
use crate::SchedulingError;

const NEXT_STEP_RPC: &str = "/rest/v1/rpc/refresh_episode_next_step";
const FORECAST_RPC: &str = "/rest/v1/rpc/refresh_episode_forecast";

/// Triggers the database-side recompute functions for an episode's
/// next-step and forecast caches.
pub struct SupabaseEpisodeCacheRefresher {
    supabase: Arc<SupabaseClient>,
    service_key: String,
}

impl SupabaseEpisodeCacheRefresher {
    pub fn new(supabase: Arc<SupabaseClient>, config: &AppConfig) -> Self {
        Self {
            supabase,
            service_key: config.supabase_service_role_key.clone(),
        }
    }

    async fn call(&self, rpc: &str, episode_id: Uuid) -> Result<(), SchedulingError> {
        debug!("Calling {} for episode {}", rpc, episode_id);

        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=minimal"));

        self.supabase
            .request_with_headers::<Value>(
                Method::POST,
                rpc,
                Some(&self.service_key),
                Some(json!({ "p_episode_id": episode_id })),
                Some(headers),
            )
            .await
            .map(|_| ())
            .map_err(|e| SchedulingError::CacheRefresh {
                episode_id,
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl EpisodeCacheRefresher for SupabaseEpisodeCacheRefresher {
    async fn refresh_next_step(&self, episode_id: Uuid) -> Result<(), SchedulingError> {
        self.call(NEXT_STEP_RPC, episode_id).await
    }

    async fn refresh_forecast(&self, episode_id: Uuid) -> Result<(), SchedulingError> {
        self.call(FORECAST_RPC, episode_id).await
    }
}
