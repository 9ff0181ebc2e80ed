use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::services::store::{EpisodeCacheRefresher, SchedulingStore};
use crate::{CacheRefreshResult, SchedulingEntity, SchedulingError, SchedulingEvent};

/// Drains the scheduling event log and refreshes the derived caches of every
/// episode the drained events touch.
///
/// Events are marked processed after one attempt whether or not their
/// refresh succeeded. If the mark itself is rejected, every event in the
/// batch counts as failed and is drained again by the next run.
pub struct CacheRefreshWorker {
    store: Arc<dyn SchedulingStore>,
    refresher: Arc<dyn EpisodeCacheRefresher>,
}

impl CacheRefreshWorker {
    pub fn new(store: Arc<dyn SchedulingStore>, refresher: Arc<dyn EpisodeCacheRefresher>) -> Self {
        Self { store, refresher }
    }

    #[instrument(skip(self))]
    pub async fn process_events_batch(&self, batch_size: usize) -> Result<CacheRefreshResult, SchedulingError> {
        let mut result = CacheRefreshResult::default();
        if batch_size == 0 {
            return Ok(result);
        }

        let events = self.store.list_unprocessed_events(batch_size).await?;
        if events.is_empty() {
            debug!("No unprocessed scheduling events");
            return Ok(result);
        }

        let mut seen = HashSet::new();
        let mut episodes = Vec::new();

        for event in &events {
            match self.resolve_episode(event).await {
                Ok(Some(episode_id)) => {
                    if seen.insert(episode_id) {
                        episodes.push(episode_id);
                    }
                }
                Ok(None) => debug!("Event {} ({}) has no episode", event.id, event.entity_type),
                Err(e) => {
                    warn!("Failed to resolve episode for event {}: {}", event.id, e);
                    result.failed += 1;
                }
            }
        }

        for episode_id in episodes {
            if self.refresh_episode(episode_id).await {
                result.episodes_refreshed += 1;
            } else {
                result.failed += 1;
            }
        }

        let event_ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
        result.processed = event_ids.len();
        match self.store.mark_events_processed(&event_ids, Utc::now()).await {
            Ok(()) => {}
            Err(e) if e.is_systemic() => return Err(e),
            Err(e) => {
                error!("Failed to mark {} events processed, they will be drained again: {}", event_ids.len(), e);
                result.failed += event_ids.len();
            }
        }

        info!(
            "Processed {} scheduling events, refreshed {} episodes, {} failures",
            result.processed, result.episodes_refreshed, result.failed
        );
        Ok(result)
    }

    async fn resolve_episode(&self, event: &SchedulingEvent) -> Result<Option<Uuid>, SchedulingError> {
        match event.entity()? {
            SchedulingEntity::Appointment(id) => self.store.episode_for_appointment(id).await,
            SchedulingEntity::Intent(id) => self.store.episode_for_intent(id).await,
            SchedulingEntity::StageChange(id) => self.store.episode_for_stage_change(id).await,
        }
    }

    /// Both caches are attempted even if the first refresh fails.
    async fn refresh_episode(&self, episode_id: Uuid) -> bool {
        let next_step = self.refresher.refresh_next_step(episode_id).await;
        if let Err(e) = &next_step {
            error!("Next-step refresh failed for episode {}: {}", episode_id, e);
        }

        let forecast = self.refresher.refresh_forecast(episode_id).await;
        if let Err(e) = &forecast {
            error!("Forecast refresh failed for episode {}: {}", episode_id, e);
        }

        next_step.is_ok() && forecast.is_ok()
    }
}
