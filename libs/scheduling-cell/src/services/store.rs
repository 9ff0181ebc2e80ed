use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    CalendarConnection, Hold, HoldState, Intent, IntentCursor, IntentState,
    SchedulingError, SchedulingEvent, SlotStatus, TimeSlot,
};

/// Backing store for intents, holds, slots and scheduling events.
///
/// Every `transition_*` / `update_*` call is a single-row compare-and-set:
/// it applies only when the row is still in the expected state and returns
/// `Ok(false)` when another writer got there first. No call spans more than
/// one entity.
#[async_trait]
pub trait SchedulingStore: Send + Sync {
    /// Open intents in `(created_at, id)` order, strictly after `after`.
    async fn list_open_intents(
        &self,
        after: Option<IntentCursor>,
        limit: usize,
    ) -> Result<Vec<Intent>, SchedulingError>;

    /// Open intents whose window closed before `window_cutoff` or that were
    /// created before `created_cutoff`, oldest first.
    async fn list_expirable_intents(
        &self,
        window_cutoff: DateTime<Utc>,
        created_cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Intent>, SchedulingError>;

    async fn update_intent_priority(&self, intent_id: Uuid, priority: i32) -> Result<bool, SchedulingError>;

    async fn transition_intent(
        &self,
        intent_id: Uuid,
        from: IntentState,
        to: IntentState,
    ) -> Result<bool, SchedulingError>;

    /// Active holds with `expires_at <= now`, oldest first.
    async fn list_lapsed_holds(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Hold>, SchedulingError>;

    async fn transition_hold(&self, hold_id: Uuid, from: HoldState, to: HoldState) -> Result<bool, SchedulingError>;

    /// A doctor's available slots starting in `[from, to)`, by start time.
    async fn list_available_slots(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TimeSlot>, SchedulingError>;

    async fn transition_slot(&self, slot_id: Uuid, from: SlotStatus, to: SlotStatus) -> Result<bool, SchedulingError>;

    /// Active calendar connections for the given provider.
    async fn list_calendar_connections(&self, provider: &str) -> Result<Vec<CalendarConnection>, SchedulingError>;

    /// Unprocessed events, oldest first.
    async fn list_unprocessed_events(&self, limit: usize) -> Result<Vec<SchedulingEvent>, SchedulingError>;

    async fn mark_events_processed(&self, event_ids: &[Uuid], at: DateTime<Utc>) -> Result<(), SchedulingError>;

    async fn episode_for_appointment(&self, appointment_id: Uuid) -> Result<Option<Uuid>, SchedulingError>;

    async fn episode_for_intent(&self, intent_id: Uuid) -> Result<Option<Uuid>, SchedulingError>;

    async fn episode_for_stage_change(&self, stage_change_id: Uuid) -> Result<Option<Uuid>, SchedulingError>;
}

/// Recomputes the derived per-episode caches. Both calls are idempotent.
#[async_trait]
pub trait EpisodeCacheRefresher: Send + Sync {
    async fn refresh_next_step(&self, episode_id: Uuid) -> Result<(), SchedulingError>;

    async fn refresh_forecast(&self, episode_id: Uuid) -> Result<(), SchedulingError>;
}

/// Rejects a move no job here is allowed to make, before the store is touched.
pub(crate) fn ensure_transition<S: fmt::Display>(
    entity: &'static str,
    from: S,
    to: S,
    allowed: bool,
) -> Result<(), SchedulingError> {
    if allowed {
        return Ok(());
    }
    Err(SchedulingError::InvalidTransition {
        entity,
        from: from.to_string(),
        to: to.to_string(),
    })
}
