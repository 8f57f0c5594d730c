//! Live mirror of the signed-in user's entry collection.
//!
//! Every store notification carries the whole collection, so each one is
//! turned into a fresh immutable [`Snapshot`] that replaces the previous one.
//! Nothing is patched in place.

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::{Stream, StreamExt};
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use crate::entry::{Entry, EntryId, UserId};
use crate::error::{JournalError, Result};
use crate::store::{EventSink, RemoteStore, StoreEvent, SubscriptionHandle};

/// One authoritative view of a user's entries, newest first.
#[derive(Debug, Clone)]
pub struct Snapshot {
    user: UserId,
    revision: u64,
    entries: Arc<[Entry]>,
    /// Liveness flag of the subscription that produced this snapshot.
    origin: Option<Arc<AtomicBool>>,
}

impl Snapshot {
    /// Entries repeating an earlier id are dropped.
    pub fn new(user: UserId, revision: u64, entries: Vec<Entry>) -> Self {
        let mut seen = HashSet::with_capacity(entries.len());
        let entries: Vec<Entry> = entries
            .into_iter()
            .filter(|e| {
                let first = seen.insert(e.id.clone());
                if !first {
                    warn!("dropping duplicate entry {} in snapshot for {}", e.id, user);
                }
                first
            })
            .collect();
        Snapshot {
            user,
            revision,
            entries: entries.into(),
            origin: None,
        }
    }

    fn from_subscription(mut self, live: &Arc<AtomicBool>) -> Self {
        self.origin = Some(live.clone());
        self
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Position of this snapshot within its subscription, starting at 1.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &EntryId) -> Option<&Entry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    /// Identity comparison: true only for clones of the same snapshot.
    pub fn same_as(&self, other: &Snapshot) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }

    /// True when both snapshots came from the same subscription.
    pub fn same_subscription(&self, other: &Snapshot) -> bool {
        match (&self.origin, &other.origin) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    Live { user: UserId },
    Failed { user: UserId, reason: String },
}

#[derive(Debug)]
struct Shared {
    latest: Option<Snapshot>,
    status: SyncStatus,
}

struct ActiveSubscription {
    user: UserId,
    live: Arc<AtomicBool>,
    handle: SubscriptionHandle,
}

/// Snapshots of one subscription, in store delivery order.
///
/// Ends as soon as the subscription is cancelled, even if notifications were
/// still queued, and right after a subscription failure has been yielded.
pub struct SnapshotStream {
    rx: UnboundedReceiver<Result<Snapshot>>,
    live: Arc<AtomicBool>,
}

impl SnapshotStream {
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

impl Stream for SnapshotStream {
    type Item = Result<Snapshot>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if !self.live.load(Ordering::SeqCst) {
            return Poll::Ready(None);
        }
        self.rx.poll_next_unpin(cx)
    }
}

pub struct EntrySynchronizer {
    store: Arc<dyn RemoteStore>,
    shared: Arc<Mutex<Shared>>,
    active: Option<ActiveSubscription>,
    last_user: Option<UserId>,
}

impl EntrySynchronizer {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        EntrySynchronizer {
            store,
            shared: Arc::new(Mutex::new(Shared {
                latest: None,
                status: SyncStatus::Idle,
            })),
            active: None,
            last_user: None,
        }
    }

    /// Opens the live subscription for `user`, cancelling any previous one
    /// first. The store's current collection is already queued on the
    /// returned stream.
    pub fn subscribe(&mut self, user: &UserId) -> Result<SnapshotStream> {
        self.unsubscribe();

        let live = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::unbounded();
        {
            let mut shared = self.lock_shared();
            shared.status = SyncStatus::Live { user: user.clone() };
        }
        self.last_user = Some(user.clone());

        let sink = snapshot_sink(user.clone(), live.clone(), self.shared.clone(), tx);
        match self.store.subscribe(user, sink) {
            Ok(handle) => {
                info!("subscribed to entries for {}", user);
                self.active = Some(ActiveSubscription {
                    user: user.clone(),
                    live: live.clone(),
                    handle,
                });
                Ok(SnapshotStream { rx, live })
            }
            Err(e) => {
                live.store(false, Ordering::SeqCst);
                error!("could not subscribe to entries for {}: {}", user, e);
                let reason = e.to_string();
                self.lock_shared().status = SyncStatus::Failed {
                    user: user.clone(),
                    reason: reason.clone(),
                };
                Err(JournalError::RemoteSubscriptionFailed(reason))
            }
        }
    }

    /// Subscribes again for the most recent user, e.g. after a failure.
    pub fn resubscribe(&mut self) -> Result<SnapshotStream> {
        let user = self.last_user.clone().ok_or(JournalError::NoUserContext)?;
        self.subscribe(&user)
    }

    /// Synchronously detaches from the store. Nothing queued or arriving
    /// later reaches the old stream.
    pub fn unsubscribe(&mut self) {
        if let Some(active) = self.active.take() {
            active.live.store(false, Ordering::SeqCst);
            active.handle.cancel();
            info!("unsubscribed from entries for {}", active.user);
        }
        let mut shared = self.lock_shared();
        shared.latest = None;
        shared.status = SyncStatus::Idle;
    }

    pub fn latest(&self) -> Option<Snapshot> {
        self.lock_shared().latest.clone()
    }

    pub fn status(&self) -> SyncStatus {
        self.lock_shared().status.clone()
    }

    pub fn current_user(&self) -> Option<&UserId> {
        self.active.as_ref().map(|a| &a.user)
    }

    /// Whether `snapshot` was produced by the subscription that is active
    /// right now. Snapshots built by hand or from an earlier subscription
    /// never are.
    pub fn is_current(&self, snapshot: &Snapshot) -> bool {
        match (&self.active, &snapshot.origin) {
            (Some(active), Some(origin)) => {
                Arc::ptr_eq(&active.live, origin) && active.live.load(Ordering::SeqCst)
            }
            _ => false,
        }
    }

    fn lock_shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for EntrySynchronizer {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

fn snapshot_sink(
    user: UserId,
    live: Arc<AtomicBool>,
    shared: Arc<Mutex<Shared>>,
    tx: UnboundedSender<Result<Snapshot>>,
) -> EventSink {
    let revision = AtomicU64::new(0);
    let failed = AtomicBool::new(false);

    Arc::new(move |event: StoreEvent| {
        if !live.load(Ordering::SeqCst) || failed.load(Ordering::SeqCst) {
            return;
        }
        match event {
            StoreEvent::Changed(entries) => {
                let revision = revision.fetch_add(1, Ordering::SeqCst) + 1;
                let snapshot = Snapshot::new(user.clone(), revision, entries).from_subscription(&live);
                debug!(
                    "snapshot {} for {}: {} entries",
                    revision,
                    user,
                    snapshot.len()
                );
                shared
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .latest = Some(snapshot.clone());
                if tx.unbounded_send(Ok(snapshot)).is_err() {
                    debug!("snapshot consumer for {} is gone", user);
                }
            }
            StoreEvent::Failed(err) => {
                failed.store(true, Ordering::SeqCst);
                error!("entry subscription for {} failed: {}", user, err);
                let reason = err.to_string();
                shared
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .status = SyncStatus::Failed {
                    user: user.clone(),
                    reason: reason.clone(),
                };
                let _ = tx.unbounded_send(Err(JournalError::RemoteSubscriptionFailed(reason)));
                tx.close_channel();
            }
        }
    })
}
