use log::warn;
use std::path::PathBuf;
use std::time::Duration;

use crate::draft::DEFAULT_AUTOSAVE_INTERVAL;

pub const AUTOSAVE_ENV: &str = "JOURNAL_AUTOSAVE_MS";
pub const DRAFT_PATH_ENV: &str = "JOURNAL_DRAFT_PATH";
pub const LOG_ENV: &str = "JOURNAL_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalConfig {
    pub autosave_interval: Duration,
    pub draft_path: PathBuf,
    /// Default `env_logger` filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for JournalConfig {
    fn default() -> Self {
        JournalConfig {
            autosave_interval: DEFAULT_AUTOSAVE_INTERVAL,
            draft_path: PathBuf::from("journal_drafts.json"),
            log_filter: "info".to_string(),
        }
    }
}

impl JournalConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; bad values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = JournalConfig::default();

        if let Some(raw) = lookup(AUTOSAVE_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => config.autosave_interval = Duration::from_millis(ms),
                _ => warn!(
                    "ignoring {}={:?}, using {}ms",
                    AUTOSAVE_ENV,
                    raw,
                    config.autosave_interval.as_millis()
                ),
            }
        }

        if let Some(path) = lookup(DRAFT_PATH_ENV).filter(|p| !p.trim().is_empty()) {
            config.draft_path = PathBuf::from(path);
        }

        if let Some(filter) = lookup(LOG_ENV).filter(|f| !f.trim().is_empty()) {
            config.log_filter = filter;
        }

        config
    }
}
