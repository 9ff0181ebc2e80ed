use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Read-only projection of an external calendar entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarEvent {
    pub id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conflict {
    pub slot_id: Uuid,
    pub slot_start: DateTime<Utc>,
    pub slot_end: DateTime<Utc>,
    pub event_id: String,
    pub event_start: DateTime<Utc>,
    pub event_end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconciliationReport {
    pub user_id: Uuid,
    pub slots_checked: usize,
    pub conflicts: Vec<Conflict>,
    pub blocks_applied: usize,
    pub errors: Vec<String>,
}

impl ReconciliationReport {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            slots_checked: 0,
            conflicts: Vec::new(),
            blocks_applied: 0,
            errors: Vec::new(),
        }
    }
}

// Google Calendar v3 wire types

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleEventList {
    #[serde(default)]
    pub items: Vec<GoogleEvent>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleEvent {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub transparency: Option<String>,
    #[serde(default)]
    pub start: Option<GoogleEventTime>,
    #[serde(default)]
    pub end: Option<GoogleEventTime>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleEventTime {
    #[serde(default)]
    pub date_time: Option<DateTime<chrono::FixedOffset>>,
    #[serde(default)]
    pub date: Option<chrono::NaiveDate>,
}
