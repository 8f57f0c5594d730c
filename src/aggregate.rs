//! Display aggregates derived from a snapshot.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::entry::Entry;
use crate::streak::compute_streak_on;
use crate::sync::Snapshot;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JournalStats {
    pub total_entries: usize,
    pub total_words: usize,
    pub unique_moods: usize,
    pub streak: u32,
    /// Distinct mood tags, sorted, for populating the mood filter.
    pub moods: Vec<String>,
}

pub fn mood_vocabulary(entries: &[Entry]) -> Vec<String> {
    entries
        .iter()
        .flat_map(|e| e.mood_tags.iter())
        .cloned()
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect()
}

pub fn compute_stats(entries: &[Entry], today: NaiveDate) -> JournalStats {
    let moods = mood_vocabulary(entries);
    JournalStats {
        total_entries: entries.len(),
        total_words: entries.iter().map(Entry::word_count).sum(),
        unique_moods: moods.len(),
        streak: compute_streak_on(entries, today),
        moods,
    }
}

/// Recomputes stats per snapshot, reusing the last result while the
/// snapshot is the same one and the UTC day has not rolled over.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    cached: Option<(Snapshot, NaiveDate, JournalStats)>,
    computations: usize,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&mut self, snapshot: &Snapshot) -> &JournalStats {
        self.stats_on(snapshot, Utc::now().date_naive())
    }

    pub fn stats_on(&mut self, snapshot: &Snapshot, today: NaiveDate) -> &JournalStats {
        let reusable = matches!(
            &self.cached,
            Some((cached, day, _)) if cached.same_as(snapshot) && *day == today
        );
        if !reusable {
            self.computations += 1;
            self.cached = None;
        }
        let (_, _, stats) = self.cached.get_or_insert_with(|| {
            (snapshot.clone(), today, compute_stats(snapshot.entries(), today))
        });
        stats
    }

    /// How many times stats were computed rather than served from cache.
    pub fn computations(&self) -> usize {
        self.computations
    }

    pub fn clear(&mut self) {
        self.cached = None;
    }
}
