//! Remote document store seam.
//!
//! Entries live under a per-user namespace (`users/<uid>/journal_entries/<id>`)
//! next to a per-user settings document. Every method takes the user as part
//! of the path, so no call can reach another user's collection.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::entry::{Entry, EntryId, EntryPatch, NewEntry, UserId};
use crate::error::StoreError;
use crate::settings::UserSettings;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Notification delivered to a subscriber.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// The complete current collection, newest first.
    Changed(Vec<Entry>),
    /// The listener errored; no further events follow.
    Failed(StoreError),
}

pub type EventSink = Arc<dyn Fn(StoreEvent) + Send + Sync>;

/// Cancels a registration when `cancel` is called or the handle is dropped.
pub struct SubscriptionHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        SubscriptionHandle {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle with nothing to cancel.
    pub fn noop() -> Self {
        SubscriptionHandle { cancel: None }
    }

    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Registers `sink` for the user's entries ordered by timestamp
    /// descending. The current collection is delivered before this returns.
    fn subscribe(&self, user: &UserId, sink: EventSink) -> StoreResult<SubscriptionHandle>;

    /// Adds a document and stamps it with the server time.
    async fn create(&self, user: &UserId, fields: NewEntry) -> StoreResult<EntryId>;

    /// Patches an existing document; fails with `NotFound` if absent.
    async fn update(&self, user: &UserId, id: &EntryId, patch: EntryPatch) -> StoreResult<()>;

    /// Merge-writes the patch and refreshes the server timestamp, creating
    /// the document if it does not exist.
    async fn merge(&self, user: &UserId, id: &EntryId, patch: EntryPatch) -> StoreResult<()>;

    /// Removing a missing document is not an error.
    async fn delete(&self, user: &UserId, id: &EntryId) -> StoreResult<()>;

    async fn get_once(&self, user: &UserId, id: &EntryId) -> StoreResult<Option<Entry>>;

    async fn list(&self, user: &UserId) -> StoreResult<Vec<Entry>>;

    async fn load_settings(&self, user: &UserId) -> StoreResult<Option<UserSettings>>;

    async fn save_settings(&self, user: &UserId, settings: UserSettings) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn handle_cancels_once_on_explicit_cancel() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handle = SubscriptionHandle::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        handle.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handle_cancels_on_drop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        {
            let _handle = SubscriptionHandle::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
