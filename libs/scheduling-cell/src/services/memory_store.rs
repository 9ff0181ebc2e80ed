use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::services::store::{ensure_transition, SchedulingStore};
use crate::{
    CalendarConnection, Hold, HoldState, Intent, IntentCursor, IntentState,
    SchedulingError, SchedulingEvent, SlotStatus, TimeSlot,
};

#[derive(Default)]
struct MemoryState {
    intents: HashMap<Uuid, Intent>,
    holds: HashMap<Uuid, Hold>,
    slots: HashMap<Uuid, TimeSlot>,
    connections: Vec<CalendarConnection>,
    events: Vec<SchedulingEvent>,
    appointment_episodes: HashMap<Uuid, Uuid>,
    stage_change_episodes: HashMap<Uuid, Uuid>,
    failing_ids: HashSet<Uuid>,
    unavailable: bool,
}

/// Process-local store used by local runs and the test suites.
///
/// `fail_updates_for` makes every operation touching that id fail with a
/// per-item error; `set_unavailable` makes every call fail systemically.
#[derive(Default)]
pub struct InMemorySchedulingStore {
    state: RwLock<MemoryState>,
}

impl InMemorySchedulingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_intent(&self, intent: Intent) {
        self.state.write().await.intents.insert(intent.id, intent);
    }

    pub async fn insert_hold(&self, hold: Hold) {
        self.state.write().await.holds.insert(hold.id, hold);
    }

    pub async fn insert_slot(&self, slot: TimeSlot) {
        self.state.write().await.slots.insert(slot.id, slot);
    }

    pub async fn insert_connection(&self, connection: CalendarConnection) {
        self.state.write().await.connections.push(connection);
    }

    pub async fn insert_event(&self, event: SchedulingEvent) {
        self.state.write().await.events.push(event);
    }

    pub async fn link_appointment(&self, appointment_id: Uuid, episode_id: Uuid) {
        self.state.write().await.appointment_episodes.insert(appointment_id, episode_id);
    }

    pub async fn link_stage_change(&self, stage_change_id: Uuid, episode_id: Uuid) {
        self.state.write().await.stage_change_episodes.insert(stage_change_id, episode_id);
    }

    pub async fn fail_updates_for(&self, id: Uuid) {
        self.state.write().await.failing_ids.insert(id);
    }

    pub async fn clear_failures(&self) {
        self.state.write().await.failing_ids.clear();
    }

    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    pub async fn intent(&self, id: Uuid) -> Option<Intent> {
        self.state.read().await.intents.get(&id).cloned()
    }

    pub async fn hold(&self, id: Uuid) -> Option<Hold> {
        self.state.read().await.holds.get(&id).cloned()
    }

    pub async fn slot(&self, id: Uuid) -> Option<TimeSlot> {
        self.state.read().await.slots.get(&id).cloned()
    }

    pub async fn event(&self, id: Uuid) -> Option<SchedulingEvent> {
        self.state.read().await.events.iter().find(|e| e.id == id).cloned()
    }
}

impl MemoryState {
    fn check_available(&self) -> Result<(), SchedulingError> {
        if self.unavailable {
            return Err(SchedulingError::StoreUnavailable("in-memory store offline".to_string()));
        }
        Ok(())
    }

    fn check_item(&self, id: Uuid) -> Result<(), SchedulingError> {
        self.check_available()?;
        if self.failing_ids.contains(&id) {
            return Err(SchedulingError::Store(format!("injected failure for {}", id)));
        }
        Ok(())
    }
}

fn sorted_by_creation(mut intents: Vec<Intent>) -> Vec<Intent> {
    intents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    intents
}

#[async_trait]
impl SchedulingStore for InMemorySchedulingStore {
    async fn list_open_intents(
        &self,
        after: Option<IntentCursor>,
        limit: usize,
    ) -> Result<Vec<Intent>, SchedulingError> {
        let state = self.state.read().await;
        state.check_available()?;

        let open = state
            .intents
            .values()
            .filter(|intent| intent.state == IntentState::Open)
            .filter(|intent| match after {
                Some(cursor) => (intent.created_at, intent.id) > (cursor.created_at, cursor.id),
                None => true,
            })
            .cloned()
            .collect();

        Ok(sorted_by_creation(open).into_iter().take(limit).collect())
    }

    async fn list_expirable_intents(
        &self,
        window_cutoff: DateTime<Utc>,
        created_cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Intent>, SchedulingError> {
        let state = self.state.read().await;
        state.check_available()?;

        let due = state
            .intents
            .values()
            .filter(|intent| intent.is_expirable(window_cutoff, created_cutoff))
            .cloned()
            .collect();

        Ok(sorted_by_creation(due).into_iter().take(limit).collect())
    }

    async fn update_intent_priority(&self, intent_id: Uuid, priority: i32) -> Result<bool, SchedulingError> {
        let mut state = self.state.write().await;
        state.check_item(intent_id)?;

        match state.intents.get_mut(&intent_id) {
            Some(intent) if intent.state == IntentState::Open => {
                intent.priority = priority;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transition_intent(
        &self,
        intent_id: Uuid,
        from: IntentState,
        to: IntentState,
    ) -> Result<bool, SchedulingError> {
        ensure_transition("intent", from, to, from.can_transition_to(&to))?;
        let mut state = self.state.write().await;
        state.check_item(intent_id)?;

        match state.intents.get_mut(&intent_id) {
            Some(intent) if intent.state == from => {
                intent.state = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_lapsed_holds(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Hold>, SchedulingError> {
        let state = self.state.read().await;
        state.check_available()?;

        let mut lapsed: Vec<Hold> = state
            .holds
            .values()
            .filter(|hold| hold.is_lapsed(now))
            .cloned()
            .collect();
        lapsed.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        lapsed.truncate(limit);
        Ok(lapsed)
    }

    async fn transition_hold(&self, hold_id: Uuid, from: HoldState, to: HoldState) -> Result<bool, SchedulingError> {
        ensure_transition("hold", from, to, from.can_transition_to(&to))?;
        let mut state = self.state.write().await;
        state.check_item(hold_id)?;

        match state.holds.get_mut(&hold_id) {
            Some(hold) if hold.state == from => {
                hold.state = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_available_slots(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TimeSlot>, SchedulingError> {
        let state = self.state.read().await;
        state.check_item(doctor_id)?;

        let mut slots: Vec<TimeSlot> = state
            .slots
            .values()
            .filter(|slot| {
                slot.doctor_id == doctor_id
                    && slot.status == SlotStatus::Available
                    && slot.start_time >= from
                    && slot.start_time < to
            })
            .cloned()
            .collect();
        slots.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        Ok(slots)
    }

    async fn transition_slot(&self, slot_id: Uuid, from: SlotStatus, to: SlotStatus) -> Result<bool, SchedulingError> {
        ensure_transition("slot", from, to, from.can_transition_to(&to))?;
        let mut state = self.state.write().await;
        state.check_item(slot_id)?;

        match state.slots.get_mut(&slot_id) {
            Some(slot) if slot.status == from => {
                debug!("Slot {} {} -> {}", slot_id, from, to);
                slot.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_calendar_connections(&self, provider: &str) -> Result<Vec<CalendarConnection>, SchedulingError> {
        let state = self.state.read().await;
        state.check_available()?;

        Ok(state
            .connections
            .iter()
            .filter(|c| c.is_active && c.provider == provider)
            .cloned()
            .collect())
    }

    async fn list_unprocessed_events(&self, limit: usize) -> Result<Vec<SchedulingEvent>, SchedulingError> {
        let state = self.state.read().await;
        state.check_available()?;

        let mut pending: Vec<SchedulingEvent> = state
            .events
            .iter()
            .filter(|event| event.processed_at.is_none())
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn mark_events_processed(&self, event_ids: &[Uuid], at: DateTime<Utc>) -> Result<(), SchedulingError> {
        let mut state = self.state.write().await;
        state.check_available()?;
        // One update covers the batch, so one bad id rejects all of it.
        for id in event_ids {
            state.check_item(*id)?;
        }

        for event in state.events.iter_mut() {
            if event.processed_at.is_none() && event_ids.contains(&event.id) {
                event.processed_at = Some(at);
            }
        }
        Ok(())
    }

    async fn episode_for_appointment(&self, appointment_id: Uuid) -> Result<Option<Uuid>, SchedulingError> {
        let state = self.state.read().await;
        state.check_item(appointment_id)?;
        Ok(state.appointment_episodes.get(&appointment_id).copied())
    }

    async fn episode_for_intent(&self, intent_id: Uuid) -> Result<Option<Uuid>, SchedulingError> {
        let state = self.state.read().await;
        state.check_item(intent_id)?;
        Ok(state.intents.get(&intent_id).and_then(|intent| intent.episode_id))
    }

    async fn episode_for_stage_change(&self, stage_change_id: Uuid) -> Result<Option<Uuid>, SchedulingError> {
        let state = self.state.read().await;
        state.check_item(stage_change_id)?;
        Ok(state.stage_change_episodes.get(&stage_change_id).copied())
    }
}
