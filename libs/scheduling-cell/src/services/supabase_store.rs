use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Method,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::services::store::{ensure_transition, SchedulingStore};
use crate::{
    CalendarConnection, Hold, HoldState, Intent, IntentCursor, IntentState,
    SchedulingError, SchedulingEvent, SlotStatus, TimeSlot,
};

const INTENTS: &str = "/rest/v1/slot_intents";
const HOLDS: &str = "/rest/v1/slot_holds";
const SLOTS: &str = "/rest/v1/time_slots";
const CONNECTIONS: &str = "/rest/v1/calendar_connections";
const EVENTS: &str = "/rest/v1/scheduling_events";
const APPOINTMENTS: &str = "/rest/v1/appointments";
const STAGE_CHANGES: &str = "/rest/v1/episode_stage_changes";

#[derive(Debug, Deserialize)]
struct EpisodeRef {
    episode_id: Option<Uuid>,
}

/// `SchedulingStore` over PostgREST. Conditional updates put the expected
/// state in the filter and ask for the changed rows back, so an empty
/// response means the row had already moved on.
pub struct SupabaseSchedulingStore {
    supabase: Arc<SupabaseClient>,
    service_key: String,
}

impl SupabaseSchedulingStore {
    pub fn new(supabase: Arc<SupabaseClient>, config: &AppConfig) -> Self {
        Self {
            supabase,
            service_key: config.supabase_service_role_key.clone(),
        }
    }

    async fn select<T>(&self, path: &str) -> Result<Vec<T>, SchedulingError>
    where
        T: serde::de::DeserializeOwned,
    {
        self.supabase
            .request::<Vec<T>>(Method::GET, path, Some(&self.service_key), None)
            .await
            .map_err(SchedulingError::from_store)
    }

    async fn conditional_update(&self, path: &str, body: Value) -> Result<bool, SchedulingError> {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(Method::PATCH, path, Some(&self.service_key), Some(body), Some(headers))
            .await
            .map_err(SchedulingError::from_store)?;

        debug!("Conditional update {} touched {} rows", path, rows.len());
        Ok(!rows.is_empty())
    }

    async fn episode_lookup(&self, table: &str, id: Uuid) -> Result<Option<Uuid>, SchedulingError> {
        let path = format!("{}?id=eq.{}&select=episode_id", table, id);
        let rows: Vec<EpisodeRef> = self.select(&path).await?;
        Ok(rows.into_iter().next().and_then(|row| row.episode_id))
    }
}

fn ts(value: DateTime<Utc>) -> String {
    urlencoding::encode(&value.to_rfc3339_opts(SecondsFormat::Millis, true)).into_owned()
}

#[async_trait]
impl SchedulingStore for SupabaseSchedulingStore {
    async fn list_open_intents(
        &self,
        after: Option<IntentCursor>,
        limit: usize,
    ) -> Result<Vec<Intent>, SchedulingError> {
        let mut path = format!(
            "{}?state=eq.open&order=created_at.asc,id.asc&limit={}",
            INTENTS, limit
        );
        if let Some(cursor) = after {
            let created = ts(cursor.created_at);
            path.push_str(&format!(
                "&or=(created_at.gt.{c},and(created_at.eq.{c},id.gt.{id}))",
                c = created,
                id = cursor.id
            ));
        }
        self.select(&path).await
    }

    async fn list_expirable_intents(
        &self,
        window_cutoff: DateTime<Utc>,
        created_cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Intent>, SchedulingError> {
        let path = format!(
            "{}?state=eq.open&or=(window_end.lt.{},created_at.lt.{})&order=created_at.asc,id.asc&limit={}",
            INTENTS,
            ts(window_cutoff),
            ts(created_cutoff),
            limit
        );
        self.select(&path).await
    }

    async fn update_intent_priority(&self, intent_id: Uuid, priority: i32) -> Result<bool, SchedulingError> {
        let path = format!("{}?id=eq.{}&state=eq.open", INTENTS, intent_id);
        self.conditional_update(
            &path,
            json!({
                "priority": priority,
                "priority_updated_at": Utc::now().to_rfc3339()
            }),
        )
        .await
    }

    async fn transition_intent(
        &self,
        intent_id: Uuid,
        from: IntentState,
        to: IntentState,
    ) -> Result<bool, SchedulingError> {
        ensure_transition("intent", from, to, from.can_transition_to(&to))?;
        let path = format!("{}?id=eq.{}&state=eq.{}", INTENTS, intent_id, from);
        self.conditional_update(
            &path,
            json!({
                "state": to,
                "updated_at": Utc::now().to_rfc3339()
            }),
        )
        .await
    }

    async fn list_lapsed_holds(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Hold>, SchedulingError> {
        let path = format!(
            "{}?state=eq.active&expires_at=lte.{}&order=created_at.asc,id.asc&limit={}",
            HOLDS,
            ts(now),
            limit
        );
        self.select(&path).await
    }

    async fn transition_hold(&self, hold_id: Uuid, from: HoldState, to: HoldState) -> Result<bool, SchedulingError> {
        ensure_transition("hold", from, to, from.can_transition_to(&to))?;
        let path = format!("{}?id=eq.{}&state=eq.{}", HOLDS, hold_id, from);
        self.conditional_update(
            &path,
            json!({
                "state": to,
                "updated_at": Utc::now().to_rfc3339()
            }),
        )
        .await
    }

    async fn list_available_slots(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TimeSlot>, SchedulingError> {
        let path = format!(
            "{}?doctor_id=eq.{}&status=eq.available&and=(start_time.gte.{},start_time.lt.{})&order=start_time.asc",
            SLOTS,
            doctor_id,
            ts(from),
            ts(to)
        );
        self.select(&path).await
    }

    async fn transition_slot(&self, slot_id: Uuid, from: SlotStatus, to: SlotStatus) -> Result<bool, SchedulingError> {
        ensure_transition("slot", from, to, from.can_transition_to(&to))?;
        let path = format!("{}?id=eq.{}&status=eq.{}", SLOTS, slot_id, from);
        self.conditional_update(
            &path,
            json!({
                "status": to,
                "updated_at": Utc::now().to_rfc3339()
            }),
        )
        .await
    }

    async fn list_calendar_connections(&self, provider: &str) -> Result<Vec<CalendarConnection>, SchedulingError> {
        let path = format!(
            "{}?provider=eq.{}&is_active=eq.true&order=user_id.asc",
            CONNECTIONS,
            urlencoding::encode(provider)
        );
        self.select(&path).await
    }

    async fn list_unprocessed_events(&self, limit: usize) -> Result<Vec<SchedulingEvent>, SchedulingError> {
        let path = format!(
            "{}?processed_at=is.null&order=created_at.asc,id.asc&limit={}",
            EVENTS, limit
        );
        self.select(&path).await
    }

    async fn mark_events_processed(&self, event_ids: &[Uuid], at: DateTime<Utc>) -> Result<(), SchedulingError> {
        if event_ids.is_empty() {
            return Ok(());
        }

        let ids = event_ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(",");
        let path = format!("{}?id=in.({})&processed_at=is.null", EVENTS, ids);

        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=minimal"));

        self.supabase
            .request_with_headers::<()>(
                Method::PATCH,
                &path,
                Some(&self.service_key),
                Some(json!({ "processed_at": at.to_rfc3339() })),
                Some(headers),
            )
            .await
            .map_err(SchedulingError::from_store)
    }

    async fn episode_for_appointment(&self, appointment_id: Uuid) -> Result<Option<Uuid>, SchedulingError> {
        self.episode_lookup(APPOINTMENTS, appointment_id).await
    }

    async fn episode_for_intent(&self, intent_id: Uuid) -> Result<Option<Uuid>, SchedulingError> {
        self.episode_lookup(INTENTS, intent_id).await
    }

    async fn episode_for_stage_change(&self, stage_change_id: Uuid) -> Result<Option<Uuid>, SchedulingError> {
        self.episode_lookup(STAGE_CHANGES, stage_change_id).await
    }
}
