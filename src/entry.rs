use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static MARKUP_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<[^>]*>").expect("markup tag pattern is valid")
});

const PREVIEW_CHARS: usize = 100;
const SUMMARY_TAGS: usize = 3;

/// Identifier of a signed-in user; scopes every entry path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store-assigned entry identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    pub fn new(id: impl Into<String>) -> Self {
        EntryId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub mood_tags: Vec<String>,
    #[serde(default = "default_is_draft")]
    pub is_draft: bool,
    /// `None` while the store has not assigned the server time yet.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

fn default_is_draft() -> bool {
    true
}

impl Entry {
    pub fn new(id: EntryId, fields: NewEntry, timestamp: Option<DateTime<Utc>>) -> Self {
        Entry {
            id,
            title: fields.title,
            content: fields.content,
            mood_tags: fields.mood_tags,
            is_draft: fields.is_draft,
            timestamp,
        }
    }

    pub fn plain_text(&self) -> String {
        strip_markup(&self.content)
    }

    pub fn word_count(&self) -> usize {
        word_count(&self.content)
    }

    pub fn has_mood(&self, mood: &str) -> bool {
        self.mood_tags.iter().any(|m| m == mood)
    }

    /// Only the fields present in `patch` change.
    pub fn apply_patch(&mut self, patch: &EntryPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(content) = &patch.content {
            self.content = content.clone();
        }
        if let Some(mood_tags) = &patch.mood_tags {
            self.mood_tags = mood_tags.clone();
        }
        if let Some(is_draft) = patch.is_draft {
            self.is_draft = is_draft;
        }
    }

    pub fn summary(&self) -> EntrySummary {
        let title = if self.title.trim().is_empty() {
            "(untitled)".to_string()
        } else {
            self.title.clone()
        };

        EntrySummary {
            id: self.id.clone(),
            title,
            date: self
                .timestamp
                .map(|t| t.format("%b %-d, %Y").to_string()),
            preview: self.plain_text().chars().take(PREVIEW_CHARS).collect(),
            tags: self.mood_tags.iter().take(SUMMARY_TAGS).cloned().collect(),
            hidden_tags: self.mood_tags.len().saturating_sub(SUMMARY_TAGS),
            is_draft: self.is_draft,
        }
    }
}

/// Fields for a new entry. Defaults to an empty draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEntry {
    pub title: String,
    pub content: String,
    pub mood_tags: Vec<String>,
    pub is_draft: bool,
}

impl Default for NewEntry {
    fn default() -> Self {
        NewEntry {
            title: String::new(),
            content: String::new(),
            mood_tags: Vec::new(),
            is_draft: true,
        }
    }
}

impl NewEntry {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        NewEntry {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_moods<I, S>(mut self, moods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mood_tags = moods.into_iter().map(Into::into).collect();
        self
    }

    pub fn published(mut self) -> Self {
        self.is_draft = false;
        self
    }

    /// A title or some visible text after markup is stripped.
    pub fn has_meaningful_content(&self) -> bool {
        !self.title.trim().is_empty() || !strip_markup(&self.content).trim().is_empty()
    }

    pub fn into_patch(self) -> EntryPatch {
        EntryPatch {
            title: Some(self.title),
            content: Some(self.content),
            mood_tags: Some(self.mood_tags),
            is_draft: Some(self.is_draft),
        }
    }
}

/// Partial update; `None` leaves the stored field alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood_tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_draft: Option<bool>,
}

impl EntryPatch {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn mood_tags(mut self, tags: Vec<String>) -> Self {
        self.mood_tags = Some(tags);
        self
    }

    pub fn is_draft(mut self, is_draft: bool) -> Self {
        self.is_draft = Some(is_draft);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.mood_tags.is_none()
            && self.is_draft.is_none()
    }
}

/// Display-ready digest of an entry for list views.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntrySummary {
    pub id: EntryId,
    pub title: String,
    pub date: Option<String>,
    pub preview: String,
    pub tags: Vec<String>,
    pub hidden_tags: usize,
    pub is_draft: bool,
}

pub fn strip_markup(markup: &str) -> String {
    MARKUP_TAG.replace_all(markup, "").into_owned()
}

pub fn word_count(markup: &str) -> usize {
    strip_markup(markup).split_whitespace().count()
}
