use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub google_calendar_base_url: String,
    pub port: u16,
    pub scheduling: SchedulingConfig,
}

/// Policy knobs for the sweepers, the recompute job and reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulingConfig {
    pub batch_size: usize,
    pub intent_expiry_grace_hours: i64,
    pub intent_max_age_days: i64,
    pub reconciliation_window_days: i64,
    pub reconciliation_concurrency: usize,
    pub default_slot_minutes: i64,
    pub priority_recompute_max_pages: usize,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            intent_expiry_grace_hours: 48,
            intent_max_age_days: 60,
            reconciliation_window_days: 14,
            reconciliation_concurrency: 4,
            default_slot_minutes: 30,
            priority_recompute_max_pages: 20,
        }
    }
}

impl SchedulingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: parse_or("SCHEDULING_BATCH_SIZE", defaults.batch_size).max(1),
            intent_expiry_grace_hours: parse_or("INTENT_EXPIRY_GRACE_HOURS", defaults.intent_expiry_grace_hours),
            intent_max_age_days: parse_or("INTENT_MAX_AGE_DAYS", defaults.intent_max_age_days),
            reconciliation_window_days: parse_or("RECONCILIATION_WINDOW_DAYS", defaults.reconciliation_window_days),
            reconciliation_concurrency: parse_or("RECONCILIATION_CONCURRENCY", defaults.reconciliation_concurrency).max(1),
            default_slot_minutes: parse_or("DEFAULT_SLOT_MINUTES", defaults.default_slot_minutes),
            priority_recompute_max_pages: parse_or("PRIORITY_RECOMPUTE_MAX_PAGES", defaults.priority_recompute_max_pages).max(1),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            google_calendar_base_url: env::var("GOOGLE_CALENDAR_BASE_URL")
                .unwrap_or_else(|_| "https://www.googleapis.com/calendar/v3".to_string()),
            port: parse_or("PORT", 3000),
            scheduling: SchedulingConfig::from_env(),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_service_role_key.is_empty()
    }
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
