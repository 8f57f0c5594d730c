//! Local draft persistence and the autosave timer.
//!
//! Drafts are a crash/reload fallback only. They are never pushed to the
//! remote store or merged with remote edits; the last local write wins.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::entry::UserId;
use crate::error::Result;

pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftRecord {
    pub title: String,
    pub content: String,
    #[serde(rename = "savedAt", with = "chrono::serde::ts_milliseconds")]
    pub saved_at: DateTime<Utc>,
}

impl DraftRecord {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        DraftRecord {
            title: title.into(),
            content: content.into(),
            saved_at: Utc::now(),
        }
    }
}

pub fn draft_key(user: &UserId) -> String {
    format!("draft-{}", user)
}

/// One draft slot per user.
pub trait DraftStore: Send + Sync {
    fn save(&self, user: &UserId, draft: &DraftRecord) -> Result<()>;
    fn load(&self, user: &UserId) -> Result<Option<DraftRecord>>;
    fn clear(&self, user: &UserId) -> Result<()>;
}

/// Process-local draft storage.
#[derive(Debug, Default)]
pub struct MemoryDraftStore {
    drafts: Mutex<HashMap<String, DraftRecord>>,
    writes: AtomicUsize,
}

impl MemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `save` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, DraftRecord>> {
        self.drafts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DraftStore for MemoryDraftStore {
    fn save(&self, user: &UserId, draft: &DraftRecord) -> Result<()> {
        self.lock().insert(draft_key(user), draft.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load(&self, user: &UserId) -> Result<Option<DraftRecord>> {
        Ok(self.lock().get(&draft_key(user)).cloned())
    }

    fn clear(&self, user: &UserId) -> Result<()> {
        self.lock().remove(&draft_key(user));
        Ok(())
    }
}

/// Drafts kept in a single JSON file so they survive restarts.
#[derive(Debug)]
pub struct FileDraftStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileDraftStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileDraftStore {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// With `discard_corrupt`, a file that does not parse reads as empty so
    /// the next write replaces it.
    fn load_from_file(&self, discard_corrupt: bool) -> Result<HashMap<String, DraftRecord>> {
        let serialized = match fs::read_to_string(&self.path) {
            Ok(serialized) => serialized,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&serialized) {
            Ok(drafts) => Ok(drafts),
            Err(e) if discard_corrupt => {
                warn!(
                    "discarding unreadable draft file {}: {}",
                    self.path.display(),
                    e
                );
                Ok(HashMap::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn save_to_file(&self, drafts: &HashMap<String, DraftRecord>) -> Result<()> {
        let serialized = serde_json::to_string(drafts)?;
        fs::write(&self.path, serialized)?;
        Ok(())
    }

    fn with_drafts<T>(
        &self,
        writing: bool,
        f: impl FnOnce(&mut HashMap<String, DraftRecord>) -> (T, bool),
    ) -> Result<T> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut drafts = self.load_from_file(writing)?;
        let (out, dirty) = f(&mut drafts);
        if dirty {
            self.save_to_file(&drafts)?;
        }
        Ok(out)
    }
}

impl DraftStore for FileDraftStore {
    fn save(&self, user: &UserId, draft: &DraftRecord) -> Result<()> {
        self.with_drafts(true, |drafts| {
            drafts.insert(draft_key(user), draft.clone());
            ((), true)
        })
    }

    fn load(&self, user: &UserId) -> Result<Option<DraftRecord>> {
        self.with_drafts(false, |drafts| (drafts.get(&draft_key(user)).cloned(), false))
    }

    fn clear(&self, user: &UserId) -> Result<()> {
        self.with_drafts(true, |drafts| {
            let removed = drafts.remove(&draft_key(user)).is_some();
            ((), removed)
        })
    }
}

/// Something that can hand over the current title and content.
pub trait DraftSource: Send + Sync {
    fn capture(&self) -> (String, String);
}

/// Recurring draft writer. Stopping it (or dropping it) guarantees no
/// further writes.
#[derive(Debug)]
pub struct Autosave {
    running: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl Autosave {
    /// Must be called within a tokio runtime. The first write happens one
    /// interval after start.
    pub fn start(
        user: UserId,
        source: Arc<dyn DraftSource>,
        store: Arc<dyn DraftStore>,
        interval: Duration,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let first_tick = Instant::now() + interval;

        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(first_tick, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !flag.load(Ordering::SeqCst) {
                    break;
                }
                let (title, content) = source.capture();
                let draft = DraftRecord::new(title, content);
                let (writer, owner, still_running) = (store.clone(), user.clone(), flag.clone());
                let saved = task::spawn_blocking(move || {
                    if still_running.load(Ordering::SeqCst) {
                        writer.save(&owner, &draft)
                    } else {
                        Ok(())
                    }
                })
                .await;
                match saved {
                    Ok(Ok(())) => debug!("autosaved draft for {}", user),
                    Ok(Err(e)) => warn!("Autosave failed for {}: {}", user, e),
                    Err(e) => warn!("Autosave task for {} did not finish: {}", user, e),
                }
            }
        });

        Autosave {
            running,
            task: Some(task),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Autosave {
    fn drop(&mut self) {
        self.stop();
    }
}
