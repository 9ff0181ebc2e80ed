use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument, warn};

use shared_config::SchedulingConfig;

use crate::services::store::SchedulingStore;
use crate::{IntentExpiryResult, IntentState, SchedulingError};

pub struct IntentExpiryService {
    store: Arc<dyn SchedulingStore>,
    config: SchedulingConfig,
}

impl IntentExpiryService {
    pub fn new(store: Arc<dyn SchedulingStore>, config: SchedulingConfig) -> Self {
        Self { store, config }
    }

    pub async fn run(&self) -> Result<IntentExpiryResult, SchedulingError> {
        self.run_at(Utc::now()).await
    }

    #[instrument(skip(self))]
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<IntentExpiryResult, SchedulingError> {
        let window_cutoff = now - Duration::hours(self.config.intent_expiry_grace_hours);
        let created_cutoff = now - Duration::days(self.config.intent_max_age_days);

        let intents = self
            .store
            .list_expirable_intents(window_cutoff, created_cutoff, self.config.batch_size)
            .await?;
        let mut result = IntentExpiryResult::default();

        for intent in intents.iter().filter(|i| i.is_expirable(window_cutoff, created_cutoff)) {
            match self
                .store
                .transition_intent(intent.id, IntentState::Open, IntentState::Expired)
                .await
            {
                Ok(true) => {
                    debug!("Intent {} expired", intent.id);
                    result.expired += 1;
                }
                Ok(false) => debug!("Intent {} was no longer open", intent.id),
                Err(e) if e.is_systemic() => return Err(e),
                Err(e) => {
                    warn!("Failed to expire intent {}: {}", intent.id, e);
                    result.errors.push(format!("intent {}: {}", intent.id, e));
                }
            }
        }

        info!(
            "Intent expiry: {} candidates, {} expired, {} errors",
            intents.len(),
            result.expired,
            result.errors.len()
        );
        Ok(result)
    }
}
