use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::SchedulingError;

// ==============================================================================
// INTENTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IntentState {
    Open,
    Fulfilled,
    Expired,
    Cancelled,
}

impl IntentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentState::Open => "open",
            IntentState::Fulfilled => "fulfilled",
            IntentState::Expired => "expired",
            IntentState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, IntentState::Open)
    }

    pub fn can_transition_to(&self, target: &IntentState) -> bool {
        matches!(self, IntentState::Open) && target.is_terminal()
    }
}

impl fmt::Display for IntentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending request for an appointment slot within a desired window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Intent {
    pub id: Uuid,
    #[serde(default)]
    pub episode_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub window_end: Option<DateTime<Utc>>,
    /// Priority assigned at submission. Aging is layered on top of this.
    #[serde(default)]
    pub base_priority: i32,
    /// Persisted effective priority, written by the recompute job.
    #[serde(default)]
    pub priority: i32,
    pub state: IntentState,
}

impl Intent {
    pub fn new(created_at: DateTime<Utc>, window_end: Option<DateTime<Utc>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            episode_id: None,
            created_at,
            window_end,
            base_priority: 0,
            priority: 0,
            state: IntentState::Open,
        }
    }

    /// An open intent expires once its window closed before `window_cutoff`
    /// or it was created before `created_cutoff`.
    pub fn is_expirable(&self, window_cutoff: DateTime<Utc>, created_cutoff: DateTime<Utc>) -> bool {
        if self.state != IntentState::Open {
            return false;
        }
        let window_lapsed = self.window_end.map_or(false, |end| end < window_cutoff);
        window_lapsed || self.created_at < created_cutoff
    }
}

/// Keyset position for paging over open intents in `(created_at, id)` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntentCursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl From<&Intent> for IntentCursor {
    fn from(intent: &Intent) -> Self {
        Self {
            created_at: intent.created_at,
            id: intent.id,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriorityScore {
    pub priority: i32,
    pub is_starvation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedIntent {
    pub intent: Intent,
    pub score: PriorityScore,
}

// ==============================================================================
// HOLDS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HoldState {
    Active,
    Expired,
    Confirmed,
}

impl HoldState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HoldState::Active => "active",
            HoldState::Expired => "expired",
            HoldState::Confirmed => "confirmed",
        }
    }

    pub fn can_transition_to(&self, target: &HoldState) -> bool {
        matches!(
            (self, target),
            (HoldState::Active, HoldState::Expired) | (HoldState::Active, HoldState::Confirmed)
        )
    }
}

impl fmt::Display for HoldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Short-lived exclusive claim on a slot pending confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hold {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub state: HoldState,
    pub created_at: DateTime<Utc>,
}

impl Hold {
    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.state == HoldState::Active && self.expires_at <= now
    }
}

// ==============================================================================
// TIME SLOTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Available,
    Held,
    Booked,
    Blocked,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Available => "available",
            SlotStatus::Held => "held",
            SlotStatus::Booked => "booked",
            SlotStatus::Blocked => "blocked",
        }
    }

    /// Transitions this core is allowed to apply. Booked slots are never touched.
    pub fn can_transition_to(&self, target: &SlotStatus) -> bool {
        matches!(
            (self, target),
            (SlotStatus::Available, SlotStatus::Blocked) | (SlotStatus::Held, SlotStatus::Available)
        )
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeSlot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    pub status: SlotStatus,
    /// Calendar event this slot was generated from, if any.
    #[serde(default)]
    pub external_event_id: Option<String>,
}

impl TimeSlot {
    /// Falls back to `default_minutes` when the row has no duration. Rejects
    /// non-positive durations and ends past the representable range.
    pub fn end_time(&self, default_minutes: i64) -> Result<DateTime<Utc>, SchedulingError> {
        let minutes = self.duration_minutes.unwrap_or(default_minutes);
        let invalid = |reason: String| SchedulingError::InvalidSlot { slot_id: self.id, reason };

        if minutes <= 0 {
            return Err(invalid(format!("duration must be positive, got {} minutes", minutes)));
        }

        Duration::try_minutes(minutes)
            .and_then(|duration| self.start_time.checked_add_signed(duration))
            .ok_or_else(|| invalid(format!("duration of {} minutes is out of range", minutes)))
    }
}

// ==============================================================================
// CALENDAR CONNECTIONS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarConnection {
    pub user_id: Uuid,
    pub provider: String,
    pub calendar_id: String,
    #[serde(default)]
    pub access_token: Option<String>,
    pub is_active: bool,
}

// ==============================================================================
// SCHEDULING EVENTS
// ==============================================================================

/// Append-only change record consumed by the cache refresh worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulingEvent {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

impl SchedulingEvent {
    pub fn new(entity: SchedulingEntity, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_type: entity.type_name().to_string(),
            entity_id: entity.id(),
            created_at,
            processed_at: None,
        }
    }

    pub fn entity(&self) -> Result<SchedulingEntity, SchedulingError> {
        SchedulingEntity::from_parts(&self.entity_type, self.entity_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulingEntity {
    Appointment(Uuid),
    Intent(Uuid),
    StageChange(Uuid),
}

impl SchedulingEntity {
    pub fn from_parts(entity_type: &str, entity_id: Uuid) -> Result<Self, SchedulingError> {
        match entity_type {
            "appointment" => Ok(SchedulingEntity::Appointment(entity_id)),
            "intent" | "slot_intent" => Ok(SchedulingEntity::Intent(entity_id)),
            "stage_change" => Ok(SchedulingEntity::StageChange(entity_id)),
            other => Err(SchedulingError::UnknownEntityType {
                entity_type: other.to_string(),
                entity_id,
            }),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SchedulingEntity::Appointment(_) => "appointment",
            SchedulingEntity::Intent(_) => "intent",
            SchedulingEntity::StageChange(_) => "stage_change",
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            SchedulingEntity::Appointment(id)
            | SchedulingEntity::Intent(id)
            | SchedulingEntity::StageChange(id) => *id,
        }
    }
}

// ==============================================================================
// RUN RESULTS
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PriorityRecomputeResult {
    pub scanned: usize,
    pub updated: usize,
    pub starved: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HoldExpiryResult {
    pub expired: usize,
    pub released: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IntentExpiryResult {
    pub expired: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CacheRefreshResult {
    pub processed: usize,
    pub episodes_refreshed: usize,
    pub failed: usize,
}
