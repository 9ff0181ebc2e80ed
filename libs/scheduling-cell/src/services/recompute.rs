use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use shared_config::SchedulingConfig;

use crate::services::priority::compute_priority;
use crate::services::store::SchedulingStore;
use crate::{IntentCursor, PriorityRecomputeResult, SchedulingError};

/// Persists the Priority Model's output for every open intent.
pub struct PriorityRecomputeService {
    store: Arc<dyn SchedulingStore>,
    config: SchedulingConfig,
}

impl PriorityRecomputeService {
    pub fn new(store: Arc<dyn SchedulingStore>, config: SchedulingConfig) -> Self {
        Self { store, config }
    }

    pub async fn run(&self) -> Result<PriorityRecomputeResult, SchedulingError> {
        self.run_at(Utc::now()).await
    }

    #[instrument(skip(self))]
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<PriorityRecomputeResult, SchedulingError> {
        let mut result = PriorityRecomputeResult::default();
        let mut cursor: Option<IntentCursor> = None;
        let page_size = self.config.batch_size;

        for page in 0..self.config.priority_recompute_max_pages {
            let intents = self.store.list_open_intents(cursor, page_size).await?;
            debug!("Priority recompute page {} has {} intents", page, intents.len());

            for intent in &intents {
                result.scanned += 1;
                let score = compute_priority(intent, now);

                if score.is_starvation {
                    result.starved += 1;
                    if intent.priority != score.priority {
                        info!("Intent {} hit the starvation guard, escalating to {}", intent.id, score.priority);
                    }
                }

                if intent.priority == score.priority {
                    continue;
                }

                match self.store.update_intent_priority(intent.id, score.priority).await {
                    Ok(true) => result.updated += 1,
                    Ok(false) => debug!("Intent {} left the open state before its priority was written", intent.id),
                    Err(e) if e.is_systemic() => return Err(e),
                    Err(e) => {
                        warn!("Failed to persist priority for intent {}: {}", intent.id, e);
                        result.errors.push(format!("intent {}: {}", intent.id, e));
                    }
                }
            }

            match intents.last() {
                Some(last) if intents.len() == page_size => cursor = Some(IntentCursor::from(last)),
                _ => break,
            }
        }

        info!(
            "Priority recompute scanned {} intents, updated {}, starved {}, errors {}",
            result.scanned,
            result.updated,
            result.starved,
            result.errors.len()
        );
        Ok(result)
    }
}
