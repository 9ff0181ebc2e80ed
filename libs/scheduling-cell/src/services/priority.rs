use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::{Intent, IntentState, PriorityScore, RankedIntent};

/// Queue age at which an intent jumps straight to `MAX_PRIORITY`.
pub const STARVATION_DAYS: i64 = 14;
pub const MAX_PRIORITY: i32 = 999;

const QUEUED_BASELINE: i64 = 50;
const AGING_PER_DAY: i64 = 2;
const AGING_CAP: i64 = 50;
const OVERDUE_PER_DAY: i64 = 5;
const OVERDUE_CAP: i64 = 50;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Effective priority of an intent at `now`.
///
/// Intents queued for `STARVATION_DAYS` or more get exactly `MAX_PRIORITY`.
/// Everything else is capped at `MAX_PRIORITY - 1`, so starved intents always
/// sort strictly first.
pub fn compute_priority(intent: &Intent, now: DateTime<Utc>) -> PriorityScore {
    let age_days = age_days(intent.created_at, now);

    if age_days >= STARVATION_DAYS {
        return PriorityScore {
            priority: MAX_PRIORITY,
            is_starvation: true,
        };
    }

    let overdue_days = intent.window_end.map_or(0, |end| overdue_days(end, now));

    let raw = i64::from(intent.base_priority)
        + QUEUED_BASELINE
        + (age_days * AGING_PER_DAY).min(AGING_CAP)
        + (overdue_days * OVERDUE_PER_DAY).min(OVERDUE_CAP);

    PriorityScore {
        priority: raw.clamp(0, i64::from(MAX_PRIORITY - 1)) as i32,
        is_starvation: false,
    }
}

/// Whole days since creation, rounded down. Future timestamps count as zero.
fn age_days(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (now - created_at).num_milliseconds();
    if millis <= 0 {
        0
    } else {
        millis / MILLIS_PER_DAY
    }
}

/// Days past the window, rounded up. Zero while the window is still open.
fn overdue_days(window_end: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (now - window_end).num_milliseconds();
    if millis <= 0 {
        0
    } else {
        (millis + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY
    }
}

/// Open intents ordered by effective priority, oldest first on ties.
pub fn rank_intents<I>(intents: I, now: DateTime<Utc>) -> Vec<RankedIntent>
where
    I: IntoIterator<Item = Intent>,
{
    let mut ranked: Vec<RankedIntent> = intents
        .into_iter()
        .filter(|intent| intent.state == IntentState::Open)
        .map(|intent| {
            let score = compute_priority(&intent, now);
            RankedIntent { intent, score }
        })
        .collect();

    ranked.sort_by(|a, b| compare_ranked(a, b));
    ranked
}

fn compare_ranked(a: &RankedIntent, b: &RankedIntent) -> Ordering {
    b.score
        .priority
        .cmp(&a.score.priority)
        .then_with(|| a.intent.created_at.cmp(&b.intent.created_at))
        .then_with(|| a.intent.id.cmp(&b.intent.id))
}
