use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

use scheduling_cell::{CalendarConnection, SchedulingStore, SlotStatus, TimeSlot};
use shared_config::SchedulingConfig;

use crate::models::{CalendarEvent, Conflict, ReconciliationReport, TimeWindow};
use crate::services::google::CalendarApi;
use crate::CalendarSyncError;

pub const GOOGLE_PROVIDER: &str = "google";

/// Half-open interval intersection. Touching endpoints do not overlap.
pub fn intervals_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Pairs each slot with the earliest-starting external event it collides
/// with. Events the slot was generated from are not collisions. Slots
/// without a valid end are skipped.
pub fn find_conflicts(slots: &[TimeSlot], events: &[CalendarEvent], default_slot_minutes: i64) -> Vec<Conflict> {
    let mut sorted: Vec<&CalendarEvent> = events.iter().collect();
    sorted.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));

    slots
        .iter()
        .filter_map(|slot| {
            let slot_end = slot.end_time(default_slot_minutes).ok()?;
            // Events starting at or after the slot end can never overlap it.
            let candidates = sorted.partition_point(|event| event.start < slot_end);

            sorted[..candidates]
                .iter()
                .find(|event| {
                    slot.external_event_id.as_deref() != Some(event.id.as_str())
                        && intervals_overlap(slot.start_time, slot_end, event.start, event.end)
                })
                .map(|event| Conflict {
                    slot_id: slot.id,
                    slot_start: slot.start_time,
                    slot_end,
                    event_id: event.id.clone(),
                    event_start: event.start,
                    event_end: event.end,
                })
        })
        .collect()
}

/// Blocks internally offered slots that collide with a doctor's external
/// calendar. Never writes to the calendar.
pub struct ReconciliationEngine {
    store: Arc<dyn SchedulingStore>,
    calendar: Arc<dyn CalendarApi>,
    config: SchedulingConfig,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn SchedulingStore>, calendar: Arc<dyn CalendarApi>, config: SchedulingConfig) -> Self {
        Self { store, calendar, config }
    }

    pub async fn run_google_reconciliation(&self) -> Result<Vec<ReconciliationReport>, CalendarSyncError> {
        self.run_at(Utc::now()).await
    }

    #[instrument(skip(self))]
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<Vec<ReconciliationReport>, CalendarSyncError> {
        let connections = self.store.list_calendar_connections(GOOGLE_PROVIDER).await?;
        let window = TimeWindow {
            start: now,
            end: now + Duration::days(self.config.reconciliation_window_days),
        };

        info!("Reconciling {} calendar connections", connections.len());

        let outcomes: Vec<Result<ReconciliationReport, CalendarSyncError>> = stream::iter(connections)
            .map(|connection| self.reconcile_user(connection, window))
            .buffered(self.config.reconciliation_concurrency.max(1))
            .collect()
            .await;

        let reports = outcomes.into_iter().collect::<Result<Vec<_>, _>>()?;

        let conflicts: usize = reports.iter().map(|r| r.conflicts.len()).sum();
        let blocks: usize = reports.iter().map(|r| r.blocks_applied).sum();
        let failed_users = reports.iter().filter(|r| !r.errors.is_empty()).count();
        info!(
            "Reconciliation finished: {} users, {} conflicts, {} blocks applied, {} users with errors",
            reports.len(),
            conflicts,
            blocks,
            failed_users
        );

        Ok(reports)
    }

    /// Per-user failures land in the report. Only a store outage escapes.
    #[instrument(skip(self, connection), fields(user_id = %connection.user_id))]
    async fn reconcile_user(
        &self,
        connection: CalendarConnection,
        window: TimeWindow,
    ) -> Result<ReconciliationReport, CalendarSyncError> {
        let mut report = ReconciliationReport::new(connection.user_id);

        if connection.access_token.as_deref().map_or(true, str::is_empty) {
            warn!("Skipping user {}: calendar connection has no access token", connection.user_id);
            report.errors.push(CalendarSyncError::MissingAccessToken(connection.user_id).to_string());
            return Ok(report);
        }

        let slots = match self
            .store
            .list_available_slots(connection.user_id, window.start, window.end)
            .await
        {
            Ok(slots) => slots,
            Err(e) if e.is_systemic() => return Err(e.into()),
            Err(e) => {
                warn!("Failed to load slots for user {}: {}", connection.user_id, e);
                report.errors.push(format!("slots: {}", e));
                return Ok(report);
            }
        };

        let events = match self.calendar.list_events(&connection, window).await {
            Ok(events) => events,
            Err(e) => {
                warn!("Failed to fetch calendar for user {}: {}", connection.user_id, e);
                report.errors.push(format!("calendar: {}", e));
                return Ok(report);
            }
        };

        debug!(
            "User {} has {} available slots and {} external events",
            connection.user_id,
            slots.len(),
            events.len()
        );

        let mut valid = Vec::with_capacity(slots.len());
        for slot in slots {
            match slot.end_time(self.config.default_slot_minutes) {
                Ok(_) => valid.push(slot),
                Err(e) => {
                    warn!("Skipping slot {} for user {}: {}", slot.id, connection.user_id, e);
                    report.errors.push(format!("slot {}: {}", slot.id, e));
                }
            }
        }

        report.slots_checked = valid.len();
        report.conflicts = find_conflicts(&valid, &events, self.config.default_slot_minutes);

        for conflict in &report.conflicts {
            match self
                .store
                .transition_slot(conflict.slot_id, SlotStatus::Available, SlotStatus::Blocked)
                .await
            {
                Ok(true) => {
                    debug!("Blocked slot {} for event {}", conflict.slot_id, conflict.event_id);
                    report.blocks_applied += 1;
                }
                Ok(false) => debug!("Slot {} was no longer available", conflict.slot_id),
                Err(e) if e.is_systemic() => return Err(e.into()),
                Err(e) => {
                    warn!("Failed to block slot {}: {}", conflict.slot_id, e);
                    report.errors.push(format!("slot {}: {}", conflict.slot_id, e));
                }
            }
        }

        Ok(report)
    }
}
