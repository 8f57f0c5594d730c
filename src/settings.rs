use log::warn;
use serde::{Deserialize, Serialize};

use crate::entry::UserId;
use crate::store::RemoteStore;

/// Per-user settings document stored next to the entry collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(rename = "darkMode", default, skip_serializing_if = "Option::is_none")]
    pub dark_mode: Option<bool>,
}

impl UserSettings {
    /// Fields set in `other` win.
    pub fn merge(&mut self, other: &UserSettings) {
        if other.dark_mode.is_some() {
            self.dark_mode = other.dark_mode;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Dark,
    Light,
}

impl Theme {
    pub fn from_settings(settings: Option<&UserSettings>) -> Self {
        match settings.and_then(|s| s.dark_mode) {
            Some(false) => Theme::Light,
            _ => Theme::Dark,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }
}

pub async fn load_theme(store: &dyn RemoteStore, user: &UserId) -> Theme {
    match store.load_settings(user).await {
        Ok(settings) => Theme::from_settings(settings.as_ref()),
        Err(e) => {
            warn!("Failed to load saved theme for {}: {}", user, e);
            Theme::Dark
        }
    }
}

pub async fn save_theme(store: &dyn RemoteStore, user: &UserId, theme: Theme) {
    let settings = UserSettings {
        dark_mode: Some(theme == Theme::Dark),
    };
    if let Err(e) = store.save_settings(user, settings).await {
        warn!("Failed to save theme for {}: {}", user, e);
    }
}
