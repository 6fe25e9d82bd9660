//! Schedule math: occurrence budgets and next-due computation.

use chrono::{DateTime, Duration, Utc};

use crate::item::{QueueItem, Reschedule, ScheduleMode};

/// Fewest occurrences a recurring post can ask for.
pub const MIN_REPEAT: u32 = 1;
/// Most occurrences a recurring post can ask for. Longer campaigns must be
/// resubmitted; this cap is operational policy.
pub const MAX_REPEAT: u32 = 365;
/// Occurrences used when a recurring post does not say.
pub const DEFAULT_REPEAT: u32 = 7;

/// Occurrence budget for a new item.
///
/// `Once` is always 1. Recurring modes take the requested count clamped to
/// `[MIN_REPEAT, MAX_REPEAT]`, or `DEFAULT_REPEAT` when absent or not finite.
pub fn occurrence_budget(mode: ScheduleMode, requested: Option<f64>) -> u32 {
    if mode == ScheduleMode::Once {
        return 1;
    }
    match requested {
        Some(n) if n.is_finite() => {
            let n = n.trunc().clamp(MIN_REPEAT as f64, MAX_REPEAT as f64);
            n as u32
        }
        _ => DEFAULT_REPEAT,
    }
}

/// Next due instant after a successful send.
///
/// The base is `max(previous_due, now)` so a late cycle does not leave a
/// backlog of past-due occurrences behind it. `Once` has no next instant.
pub fn advance_schedule(
    mode: ScheduleMode,
    previous_due: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let base = previous_due.max(now);
    match mode {
        ScheduleMode::Once => None,
        ScheduleMode::Daily => Some(base + Duration::days(1)),
        ScheduleMode::Weekly => Some(base + Duration::days(7)),
    }
}

/// What happens to an item once every target accepted the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterSuccess {
    /// Back to `queued` for the next occurrence.
    Repeat(Reschedule),
    /// Terminal `sent`.
    Done,
}

/// Decide between rescheduling and finishing.
///
/// An item repeats only if it is recurring and its budget is unbounded or
/// still positive after this send is counted.
pub fn after_success(item: &QueueItem, now: DateTime<Utc>) -> AfterSuccess {
    let remaining = item.remaining_posts.map(|r| r.saturating_sub(1));
    if !item.is_recurring() || matches!(remaining, Some(0)) {
        return AfterSuccess::Done;
    }
    match advance_schedule(item.schedule_mode, item.next_post_at, now) {
        Some(next_post_at) => AfterSuccess::Repeat(Reschedule {
            next_post_at,
            remaining_posts: remaining,
            posted_at: now,
        }),
        None => AfterSuccess::Done,
    }
}
