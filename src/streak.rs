//! Consecutive-day writing streak.

use chrono::{NaiveDate, Utc};
use std::collections::HashSet;

use crate::entry::Entry;

/// Streak ending today, using the current UTC date.
pub fn compute_streak<'a, I>(entries: I) -> u32
where
    I: IntoIterator<Item = &'a Entry>,
{
    compute_streak_on(entries, Utc::now().date_naive())
}

/// Counts consecutive UTC days with at least one entry, walking back from
/// `today`. A day without an entry ends the walk, so nothing counts unless
/// `today` itself has an entry. Entries without a timestamp are ignored.
pub fn compute_streak_on<'a, I>(entries: I, today: NaiveDate) -> u32
where
    I: IntoIterator<Item = &'a Entry>,
{
    let days: HashSet<NaiveDate> = entries
        .into_iter()
        .filter_map(|e| e.timestamp)
        .map(|t| t.date_naive())
        .collect();

    let mut streak = 0;
    let mut cursor = today;
    while days.contains(&cursor) {
        streak += 1;
        match cursor.pred_opt() {
            Some(prev) => cursor = prev,
            None => break,
        }
    }
    streak
}
