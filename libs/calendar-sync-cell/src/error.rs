use thiserror::Error;
use uuid::Uuid;

use scheduling_cell::SchedulingError;
use shared_models::error::AppError;

#[derive(Error, Debug)]
pub enum CalendarSyncError {
    #[error("Calendar authorization rejected: {0}")]
    Unauthorized(String),

    #[error("Calendar API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Calendar request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Calendar event {event_id} is malformed: {reason}")]
    InvalidEvent { event_id: String, reason: String },

    #[error("Calendar connection for user {0} has no access token")]
    MissingAccessToken(Uuid),

    #[error(transparent)]
    Store(#[from] SchedulingError),
}

impl CalendarSyncError {
    pub fn is_systemic(&self) -> bool {
        matches!(self, CalendarSyncError::Store(e) if e.is_systemic())
    }
}

impl From<CalendarSyncError> for AppError {
    fn from(err: CalendarSyncError) -> Self {
        match err {
            CalendarSyncError::Store(inner) => inner.into(),
            other => AppError::ExternalService(other.to_string()),
        }
    }
}
