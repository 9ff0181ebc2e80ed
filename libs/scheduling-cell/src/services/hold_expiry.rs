use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use shared_config::SchedulingConfig;

use crate::services::store::SchedulingStore;
use crate::{Hold, HoldExpiryResult, HoldState, SchedulingError, SlotStatus};

pub struct HoldExpiryService {
    store: Arc<dyn SchedulingStore>,
    config: SchedulingConfig,
}

impl HoldExpiryService {
    pub fn new(store: Arc<dyn SchedulingStore>, config: SchedulingConfig) -> Self {
        Self { store, config }
    }

    pub async fn run(&self) -> Result<HoldExpiryResult, SchedulingError> {
        self.run_at(Utc::now()).await
    }

    #[instrument(skip(self))]
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<HoldExpiryResult, SchedulingError> {
        let holds = self.store.list_lapsed_holds(now, self.config.batch_size).await?;
        let mut result = HoldExpiryResult::default();

        if holds.is_empty() {
            debug!("No lapsed holds");
            return Ok(result);
        }

        for hold in &holds {
            self.expire_hold(hold, &mut result).await?;
        }

        info!(
            "Hold expiry: {} lapsed, {} expired, {} slots released, {} errors",
            holds.len(),
            result.expired,
            result.released,
            result.errors.len()
        );
        Ok(result)
    }

    /// Claims the hold with `Active -> Expired` and only then releases its
    /// slot. A hold confirmed since it was listed keeps its slot. Only
    /// systemic errors are returned; the rest are recorded on `result`.
    async fn expire_hold(&self, hold: &Hold, result: &mut HoldExpiryResult) -> Result<(), SchedulingError> {
        match self
            .store
            .transition_hold(hold.id, HoldState::Active, HoldState::Expired)
            .await
        {
            Ok(true) => result.expired += 1,
            Ok(false) => {
                debug!("Hold {} was no longer active", hold.id);
                return Ok(());
            }
            Err(e) if e.is_systemic() => return Err(e),
            Err(e) => {
                warn!("Failed to expire hold {}: {}", hold.id, e);
                result.errors.push(format!("hold {} (slot {}): {}", hold.id, hold.slot_id, e));
                return Ok(());
            }
        }

        match self
            .store
            .transition_slot(hold.slot_id, SlotStatus::Held, SlotStatus::Available)
            .await
        {
            Ok(true) => result.released += 1,
            Ok(false) => debug!("Slot {} was not held", hold.slot_id),
            Err(e) if e.is_systemic() => return Err(e),
            Err(e) => {
                warn!("Hold {} expired but slot {} is still held: {}", hold.id, hold.slot_id, e);
                result.errors.push(format!(
                    "slot {} still held after hold {} expired: {}",
                    hold.slot_id, hold.id, e
                ));
            }
        }

        Ok(())
    }
}
