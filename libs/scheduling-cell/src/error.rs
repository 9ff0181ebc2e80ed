use thiserror::Error;
use uuid::Uuid;

use shared_database::SupabaseApiError;
use shared_models::error::AppError;

#[derive(Error, Debug)]
pub enum SchedulingError {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Store rejected operation: {0}")]
    Store(String),

    #[error("Invalid {entity} transition from {from} to {to}")]
    InvalidTransition { entity: &'static str, from: String, to: String },

    #[error("Invalid slot {slot_id}: {reason}")]
    InvalidSlot { slot_id: Uuid, reason: String },

    #[error("Unknown scheduling entity type '{entity_type}' for {entity_id}")]
    UnknownEntityType { entity_type: String, entity_id: Uuid },

    #[error("Cache refresh failed for episode {episode_id}: {message}")]
    CacheRefresh { episode_id: Uuid, message: String },
}

impl SchedulingError {
    /// Systemic failures abort the whole run; everything else is recorded
    /// against the single item being processed.
    pub fn is_systemic(&self) -> bool {
        matches!(self, SchedulingError::StoreUnavailable(_))
    }

    pub(crate) fn from_store(err: anyhow::Error) -> Self {
        if let Some(api_error) = err.downcast_ref::<SupabaseApiError>() {
            if api_error.is_server_error() {
                return SchedulingError::StoreUnavailable(api_error.to_string());
            }
            return SchedulingError::Store(api_error.to_string());
        }
        if err.downcast_ref::<reqwest::Error>().is_some() {
            return SchedulingError::StoreUnavailable(err.to_string());
        }
        SchedulingError::Store(err.to_string())
    }
}

impl From<SchedulingError> for AppError {
    fn from(err: SchedulingError) -> Self {
        match err {
            SchedulingError::StoreUnavailable(msg) => AppError::Unavailable(msg),
            SchedulingError::CacheRefresh { .. } => AppError::ExternalService(err.to_string()),
            other => AppError::Database(other.to_string()),
        }
    }
}
