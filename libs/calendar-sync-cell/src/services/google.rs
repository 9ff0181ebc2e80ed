use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use tracing::{debug, error, warn};

use scheduling_cell::CalendarConnection;
use shared_config::AppConfig;

use crate::models::{CalendarEvent, GoogleEvent, GoogleEventList, GoogleEventTime, TimeWindow};
use crate::CalendarSyncError;

const PAGE_SIZE: usize = 250;
const MAX_PAGES: usize = 20;

/// Read side of an external calendar.
#[async_trait]
pub trait CalendarApi: Send + Sync {
    async fn list_events(
        &self,
        connection: &CalendarConnection,
        window: TimeWindow,
    ) -> Result<Vec<CalendarEvent>, CalendarSyncError>;
}

/// Google Calendar v3 events client
/// Based on: https://developers.google.com/calendar/api/v3/reference/events/list
pub struct GoogleCalendarClient {
    client: Client,
    base_url: String,
}

impl GoogleCalendarClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.google_calendar_base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_page(
        &self,
        calendar_id: &str,
        access_token: &str,
        window: TimeWindow,
        page_token: Option<&str>,
    ) -> Result<GoogleEventList, CalendarSyncError> {
        let url = format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(calendar_id)
        );

        let mut query = vec![
            ("timeMin", window.start.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("timeMax", window.end.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
            ("maxResults", PAGE_SIZE.to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        debug!("Fetching Google Calendar events from {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!("Google Calendar request failed: {} - {}", status, body);
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CalendarSyncError::Unauthorized(body),
                _ => CalendarSyncError::Api {
                    status: status.as_u16(),
                    message: body,
                },
            });
        }

        serde_json::from_str(&body).map_err(|e| CalendarSyncError::Api {
            status: status.as_u16(),
            message: format!("Failed to parse events response: {}", e),
        })
    }
}

#[async_trait]
impl CalendarApi for GoogleCalendarClient {
    async fn list_events(
        &self,
        connection: &CalendarConnection,
        window: TimeWindow,
    ) -> Result<Vec<CalendarEvent>, CalendarSyncError> {
        let access_token = connection
            .access_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or(CalendarSyncError::MissingAccessToken(connection.user_id))?;

        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let page = self
                .fetch_page(&connection.calendar_id, access_token, window, page_token.as_deref())
                .await?;

            for item in page.items {
                match to_calendar_event(item) {
                    Ok(Some(event)) => events.push(event),
                    Ok(None) => {}
                    Err(e) => warn!("Skipping event for user {}: {}", connection.user_id, e),
                }
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => return Ok(events),
            }
        }

        warn!(
            "Calendar {} for user {} exceeded {} pages, reconciling the partial list",
            connection.calendar_id, connection.user_id, MAX_PAGES
        );
        Ok(events)
    }
}

/// Maps a Google event to the busy interval it occupies. Cancelled and
/// free (`transparent`) events occupy nothing.
pub fn to_calendar_event(event: GoogleEvent) -> Result<Option<CalendarEvent>, CalendarSyncError> {
    if event.status.as_deref() == Some("cancelled") || event.transparency.as_deref() == Some("transparent") {
        return Ok(None);
    }

    let start = event_instant(&event.id, event.start.as_ref(), "start")?;
    let end = event_instant(&event.id, event.end.as_ref(), "end")?;

    if end <= start {
        return Err(CalendarSyncError::InvalidEvent {
            event_id: event.id,
            reason: "end is not after start".to_string(),
        });
    }

    Ok(Some(CalendarEvent { id: event.id, start, end }))
}

fn event_instant(
    event_id: &str,
    time: Option<&GoogleEventTime>,
    field: &str,
) -> Result<DateTime<Utc>, CalendarSyncError> {
    let invalid = || CalendarSyncError::InvalidEvent {
        event_id: event_id.to_string(),
        reason: format!("missing {}", field),
    };

    let time = time.ok_or_else(invalid)?;
    if let Some(date_time) = time.date_time {
        return Ok(date_time.with_timezone(&Utc));
    }
    // All-day events are bounded by UTC midnights; `end.date` is exclusive.
    time.date
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        .ok_or_else(invalid)
}
