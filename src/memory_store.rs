//! In-process `RemoteStore` used by the demo client and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::entry::{Entry, EntryId, EntryPatch, NewEntry, UserId};
use crate::error::StoreError;
use crate::settings::UserSettings;
use crate::store::{EventSink, RemoteStore, StoreEvent, StoreResult, SubscriptionHandle};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Default)]
struct Collections {
    entries: HashMap<UserId, HashMap<EntryId, Entry>>,
    settings: HashMap<UserId, UserSettings>,
    listeners: HashMap<UserId, Vec<(u64, EventSink)>>,
    next_listener: u64,
    last_stamp: Option<DateTime<Utc>>,
}

impl Collections {
    fn ordered(&self, user: &UserId) -> Vec<Entry> {
        let mut entries: Vec<Entry> = self
            .entries
            .get(user)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| a.id.cmp(&b.id))
        });
        entries
    }
}

pub struct InMemoryStore {
    state: Arc<Mutex<Collections>>,
    clock: Clock,
    failing: AtomicBool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }

    /// Server timestamps come from `clock`, clamped to never go backwards.
    pub fn with_clock(clock: Clock) -> Self {
        InMemoryStore {
            state: Arc::new(Mutex::new(Collections::default())),
            clock,
            failing: AtomicBool::new(false),
        }
    }

    /// While set, every request fails with `Unavailable`.
    pub fn fail_requests(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Terminates every listener of `user` with an error event.
    pub fn break_subscriptions(&self, user: &UserId, reason: &str) {
        let sinks = self.lock().listeners.remove(user).unwrap_or_default();
        for (_, sink) in sinks {
            sink(StoreEvent::Failed(StoreError::unavailable(reason)));
        }
    }

    pub fn listener_count(&self, user: &UserId) -> usize {
        self.lock().listeners.get(user).map_or(0, Vec::len)
    }

    /// Writes a document verbatim, bypassing server timestamps.
    pub fn insert_raw(&self, user: &UserId, entry: Entry) {
        self.lock()
            .entries
            .entry(user.clone())
            .or_default()
            .insert(entry.id.clone(), entry);
        self.notify(user);
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("store is offline"));
        }
        Ok(())
    }

    fn stamp(&self, state: &mut Collections) -> DateTime<Utc> {
        let now = (self.clock)();
        let stamp = match state.last_stamp {
            Some(last) if last > now => last,
            _ => now,
        };
        state.last_stamp = Some(stamp);
        stamp
    }

    /// Listeners run after the lock is released so they may call back in.
    fn notify(&self, user: &UserId) {
        let (sinks, entries) = {
            let state = self.lock();
            let sinks: Vec<EventSink> = state
                .listeners
                .get(user)
                .map(|l| l.iter().map(|(_, sink)| sink.clone()).collect())
                .unwrap_or_default();
            (sinks, state.ordered(user))
        };
        for sink in sinks {
            sink(StoreEvent::Changed(entries.clone()));
        }
    }
}

fn entry_path(user: &UserId, id: &EntryId) -> String {
    format!("users/{}/journal_entries/{}", user, id)
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    fn subscribe(&self, user: &UserId, sink: EventSink) -> StoreResult<SubscriptionHandle> {
        self.check_available()?;
        let (listener_id, initial) = {
            let mut state = self.lock();
            let listener_id = state.next_listener;
            state.next_listener += 1;
            state
                .listeners
                .entry(user.clone())
                .or_default()
                .push((listener_id, sink.clone()));
            (listener_id, state.ordered(user))
        };
        debug!("listener {} attached to {}", listener_id, user);
        sink(StoreEvent::Changed(initial));

        let state = Arc::downgrade(&self.state);
        let user = user.clone();
        Ok(SubscriptionHandle::new(move || {
            if let Some(state) = state.upgrade() {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(listeners) = state.listeners.get_mut(&user) {
                    listeners.retain(|(id, _)| *id != listener_id);
                    if listeners.is_empty() {
                        state.listeners.remove(&user);
                    }
                }
            }
        }))
    }

    async fn create(&self, user: &UserId, fields: NewEntry) -> StoreResult<EntryId> {
        self.check_available()?;
        let id = EntryId::new(Uuid::new_v4().simple().to_string());
        {
            let mut state = self.lock();
            let stamp = self.stamp(&mut state);
            let entry = Entry::new(id.clone(), fields, Some(stamp));
            state
                .entries
                .entry(user.clone())
                .or_default()
                .insert(id.clone(), entry);
        }
        self.notify(user);
        Ok(id)
    }

    async fn update(&self, user: &UserId, id: &EntryId, patch: EntryPatch) -> StoreResult<()> {
        self.check_available()?;
        {
            let mut state = self.lock();
            let entry = state
                .entries
                .get_mut(user)
                .and_then(|docs| docs.get_mut(id))
                .ok_or_else(|| StoreError::not_found(entry_path(user, id)))?;
            entry.apply_patch(&patch);
        }
        self.notify(user);
        Ok(())
    }

    async fn merge(&self, user: &UserId, id: &EntryId, patch: EntryPatch) -> StoreResult<()> {
        self.check_available()?;
        {
            let mut state = self.lock();
            let stamp = self.stamp(&mut state);
            let entry = state
                .entries
                .entry(user.clone())
                .or_default()
                .entry(id.clone())
                .or_insert_with(|| Entry::new(id.clone(), NewEntry::default(), None));
            entry.apply_patch(&patch);
            entry.timestamp = Some(stamp);
        }
        self.notify(user);
        Ok(())
    }

    async fn delete(&self, user: &UserId, id: &EntryId) -> StoreResult<()> {
        self.check_available()?;
        let removed = self
            .lock()
            .entries
            .get_mut(user)
            .and_then(|docs| docs.remove(id))
            .is_some();
        if removed {
            self.notify(user);
        }
        Ok(())
    }

    async fn get_once(&self, user: &UserId, id: &EntryId) -> StoreResult<Option<Entry>> {
        self.check_available()?;
        Ok(self
            .lock()
            .entries
            .get(user)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn list(&self, user: &UserId) -> StoreResult<Vec<Entry>> {
        self.check_available()?;
        Ok(self.lock().ordered(user))
    }

    async fn load_settings(&self, user: &UserId) -> StoreResult<Option<UserSettings>> {
        self.check_available()?;
        Ok(self.lock().settings.get(user).cloned())
    }

    async fn save_settings(&self, user: &UserId, settings: UserSettings) -> StoreResult<()> {
        self.check_available()?;
        self.lock()
            .settings
            .entry(user.clone())
            .or_default()
            .merge(&settings);
        Ok(())
    }
}
