//! Search, mood filtering and sorting over a snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::entry::Entry;
use crate::error::JournalError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    #[default]
    DateDesc,
    DateAsc,
    Title,
}

impl SortKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::DateDesc => "date-desc",
            SortKey::DateAsc => "date-asc",
            SortKey::Title => "title",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = JournalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "date-desc" => Ok(SortKey::DateDesc),
            "date-asc" => Ok(SortKey::DateAsc),
            "title" => Ok(SortKey::Title),
            other => Err(JournalError::InvalidSortKey(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewQuery {
    /// Free-text search; blank matches everything.
    pub query: String,
    /// Exact mood tag; `None` matches everything.
    pub mood_filter: Option<String>,
    pub sort: SortKey,
}

impl ViewQuery {
    pub fn search(query: impl Into<String>) -> Self {
        ViewQuery {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_mood(mut self, mood: impl Into<String>) -> Self {
        let mood = mood.into();
        self.mood_filter = if mood.is_empty() { None } else { Some(mood) };
        self
    }

    pub fn sorted_by(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }

    pub fn matches(&self, entry: &Entry) -> bool {
        matches_search(entry, &self.query.trim().to_lowercase())
            && self.mood_filter.as_deref().map_or(true, |m| entry.has_mood(m))
    }
}

fn matches_search(entry: &Entry, needle: &str) -> bool {
    needle.is_empty()
        || entry.title.to_lowercase().contains(needle)
        || entry.content.to_lowercase().contains(needle)
        || entry
            .mood_tags
            .iter()
            .any(|m| m.to_lowercase().contains(needle))
}

/// Filters and sorts `entries` without mutating them. The sort is stable, so
/// ties keep the snapshot order.
pub fn view<'a>(entries: &'a [Entry], query: &ViewQuery) -> Vec<&'a Entry> {
    let needle = query.query.trim().to_lowercase();
    let mut visible: Vec<&Entry> = entries
        .iter()
        .filter(|e| matches_search(e, &needle))
        .filter(|e| query.mood_filter.as_deref().map_or(true, |m| e.has_mood(m)))
        .collect();

    match query.sort {
        // `None < Some(_)`, so entries without a timestamp sort as earliest.
        SortKey::DateDesc => visible.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
        SortKey::DateAsc => visible.sort_by(|a, b| a.timestamp.cmp(&b.timestamp)),
        SortKey::Title => visible.sort_by_cached_key(|e| e.title.to_lowercase()),
    }
    visible
}
