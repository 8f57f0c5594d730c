//! Per-sign-in session context.
//!
//! A `JournalSession` is created when a user signs in and torn down when
//! they sign out. It owns the live subscription, the gateway, the current
//! view query, the last applied snapshot and the edit session, so repeated
//! sign-in/out never shares state between users.

use log::{debug, info};
use std::sync::Arc;

use crate::aggregate::{JournalStats, StatsAggregator};
use crate::config::JournalConfig;
use crate::draft::DraftStore;
use crate::editor::{EditSession, RichTextBuffer};
use crate::entry::{Entry, EntryId, UserId};
use crate::error::Result;
use crate::filter::{view, SortKey, ViewQuery};
use crate::gateway::EntryGateway;
use crate::store::RemoteStore;
use crate::sync::{EntrySynchronizer, Snapshot, SnapshotStream, SyncStatus};

pub struct JournalSession {
    user: UserId,
    synchronizer: EntrySynchronizer,
    gateway: EntryGateway,
    drafts: Arc<dyn DraftStore>,
    config: JournalConfig,
    query: ViewQuery,
    snapshot: Option<Snapshot>,
    aggregator: StatsAggregator,
    editor: Option<EditSession>,
    alive: bool,
}

impl JournalSession {
    /// Opens the live subscription for `user`.
    pub fn open(
        store: Arc<dyn RemoteStore>,
        drafts: Arc<dyn DraftStore>,
        config: JournalConfig,
        user: UserId,
    ) -> Result<(Self, SnapshotStream)> {
        let mut synchronizer = EntrySynchronizer::new(store.clone());
        let stream = synchronizer.subscribe(&user)?;
        let session = JournalSession {
            gateway: EntryGateway::for_user(store, user.clone()),
            user,
            synchronizer,
            drafts,
            config,
            query: ViewQuery::default(),
            snapshot: None,
            aggregator: StatsAggregator::new(),
            editor: None,
            alive: true,
        };
        Ok((session, stream))
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Replaces the current snapshot; returns whether it was applied.
    ///
    /// Only snapshots of the live subscription are accepted, and never one
    /// older than the snapshot already applied. Re-applying the current
    /// revision is a no-op replacement.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) -> bool {
        let current = self.alive
            && snapshot.user() == &self.user
            && self.synchronizer.is_current(&snapshot);
        let outdated = self.snapshot.as_ref().is_some_and(|applied| {
            applied.same_subscription(&snapshot) && snapshot.revision() < applied.revision()
        });
        if !current || outdated {
            debug!(
                "ignoring snapshot {} for {} (session for {}, alive: {}, outdated: {})",
                snapshot.revision(),
                snapshot.user(),
                self.user,
                self.alive,
                outdated
            );
            return false;
        }
        self.snapshot = Some(snapshot);
        true
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn entries(&self) -> &[Entry] {
        match &self.snapshot {
            Some(snapshot) => snapshot.entries(),
            None => &[],
        }
    }

    pub fn entry(&self, id: &EntryId) -> Option<&Entry> {
        self.snapshot.as_ref().and_then(|s| s.get(id))
    }

    pub fn query(&self) -> &ViewQuery {
        &self.query
    }

    pub fn set_search(&mut self, query: impl Into<String>) {
        self.query.query = query.into();
    }

    pub fn set_mood_filter(&mut self, mood: Option<String>) {
        self.query.mood_filter = mood.filter(|m| !m.is_empty());
    }

    pub fn set_sort(&mut self, sort: SortKey) {
        self.query.sort = sort;
    }

    /// The current snapshot filtered and sorted by the view query.
    pub fn visible_entries(&self) -> Vec<&Entry> {
        view(self.entries(), &self.query)
    }

    pub fn stats(&mut self) -> JournalStats {
        match &self.snapshot {
            Some(snapshot) => self.aggregator.stats(snapshot).clone(),
            None => JournalStats::default(),
        }
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.synchronizer.status()
    }

    /// Reopens the subscription after a failure.
    pub fn resubscribe(&mut self) -> Result<SnapshotStream> {
        self.synchronizer.subscribe(&self.user)
    }

    pub fn gateway(&self) -> &EntryGateway {
        &self.gateway
    }

    pub async fn delete_entry(&self, id: &EntryId) -> Result<()> {
        self.gateway.remove(id).await
    }

    /// Starts a fresh edit session, stopping the previous session's autosave
    /// first. An existing entry is loaded into the buffers; for a new entry
    /// `body` keeps whatever the caller put in it.
    pub fn begin_edit(
        &mut self,
        entry: Option<&EntryId>,
        body: Arc<dyn RichTextBuffer>,
    ) -> Result<&mut EditSession> {
        self.end_edit();
        let mut editor = EditSession::new(
            self.gateway.clone(),
            self.drafts.clone(),
            body,
            self.config.autosave_interval,
        );
        if let Some(existing) = entry.and_then(|id| self.entry(id)) {
            editor.load_entry(Some(existing));
        }
        editor.start_autosave()?;
        Ok(self.editor.insert(editor))
    }

    pub fn editor(&self) -> Option<&EditSession> {
        self.editor.as_ref()
    }

    pub fn editor_mut(&mut self) -> Option<&mut EditSession> {
        self.editor.as_mut()
    }

    pub fn end_edit(&mut self) {
        if let Some(editor) = self.editor.take() {
            editor.close();
        }
    }

    /// Unsubscribes, stops autosave and drops the cached view.
    pub fn teardown(&mut self) {
        if !self.alive {
            return;
        }
        self.alive = false;
        self.end_edit();
        self.synchronizer.unsubscribe();
        self.snapshot = None;
        self.aggregator.clear();
        info!("session for {} closed", self.user);
    }
}

impl Drop for JournalSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Owns the session for whoever is signed in right now.
pub struct Journal {
    store: Arc<dyn RemoteStore>,
    drafts: Arc<dyn DraftStore>,
    config: JournalConfig,
    session: Option<JournalSession>,
}

impl Journal {
    pub fn new(store: Arc<dyn RemoteStore>, drafts: Arc<dyn DraftStore>, config: JournalConfig) -> Self {
        Journal {
            store,
            drafts,
            config,
            session: None,
        }
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    /// Reacts to an identity change. Returns the snapshot stream of the new
    /// session when a user signed in.
    pub fn handle_auth_change(&mut self, user: Option<UserId>) -> Result<Option<SnapshotStream>> {
        match user {
            Some(user) => self.sign_in(user).map(Some),
            None => {
                self.sign_out();
                Ok(None)
            }
        }
    }

    /// Tears down any existing session before opening one for `user`.
    pub fn sign_in(&mut self, user: UserId) -> Result<SnapshotStream> {
        self.sign_out();
        let (session, stream) = JournalSession::open(
            self.store.clone(),
            self.drafts.clone(),
            self.config.clone(),
            user,
        )?;
        info!("session opened for {}", session.user());
        self.session = Some(session);
        Ok(stream)
    }

    pub fn sign_out(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.teardown();
        }
    }

    pub fn session(&self) -> Option<&JournalSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut JournalSession> {
        self.session.as_mut()
    }

    /// Gateway for the signed-in user, or one that rejects every call with
    /// `NoUserContext` when nobody is signed in.
    pub fn gateway(&self) -> EntryGateway {
        match &self.session {
            Some(session) => session.gateway().clone(),
            None => EntryGateway::signed_out(self.store.clone()),
        }
    }

    /// Routes a snapshot to the live session, if it still wants it.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) -> bool {
        self.session
            .as_mut()
            .is_some_and(|session| session.apply_snapshot(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::MemoryDraftStore;
    use crate::editor::MarkupBuffer;
    use crate::entry::NewEntry;
    use crate::error::JournalError;
    use crate::memory_store::InMemoryStore;
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::time;

    fn journal() -> (Arc<InMemoryStore>, Arc<MemoryDraftStore>, Journal) {
        let store = Arc::new(InMemoryStore::new());
        let drafts = Arc::new(MemoryDraftStore::new());
        let journal = Journal::new(store.clone(), drafts.clone(), JournalConfig::default());
        (store, drafts, journal)
    }

    async fn pump(journal: &mut Journal, stream: &mut SnapshotStream) {
        let snapshot = stream.next().await.unwrap().unwrap();
        assert!(journal.apply_snapshot(snapshot));
    }

    #[tokio::test]
    async fn signed_out_journal_rejects_mutations() {
        let (_store, _drafts, journal) = journal();
        let err = journal.gateway().create(NewEntry::new("x", "")).await.unwrap_err();
        assert!(matches!(err, JournalError::NoUserContext));
    }

    #[tokio::test]
    async fn snapshot_drives_view_and_stats() {
        let (_store, _drafts, mut journal) = journal();
        let mut stream = journal.sign_in(UserId::new("u1")).unwrap();
        pump(&mut journal, &mut stream).await;

        let gateway = journal.gateway();
        gateway
            .create(NewEntry::new("Happy day", "<p>sun and sea</p>").with_moods(["happy"]))
            .await
            .unwrap();
        pump(&mut journal, &mut stream).await;
        gateway
            .create(NewEntry::new("Rain", "<p>grey</p>").with_moods(["calm"]))
            .await
            .unwrap();
        pump(&mut journal, &mut stream).await;

        let session = journal.session_mut().unwrap();
        assert_eq!(session.entries().len(), 2);
        session.set_search("happy");
        let titles: Vec<&str> = session.visible_entries().iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Happy day"]);

        session.set_search("");
        session.set_sort(SortKey::Title);
        session.set_mood_filter(Some("calm".into()));
        assert_eq!(session.visible_entries().len(), 1);

        let stats = session.stats();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.total_words, 4);
        assert_eq!(stats.moods, vec!["calm", "happy"]);
        assert_eq!(stats.streak, 1);
    }

    #[tokio::test]
    async fn sign_in_as_other_user_drops_previous_session() {
        let (store, _drafts, mut journal) = journal();
        let alice = UserId::new("alice");
        let mut first = journal.sign_in(alice.clone()).unwrap();
        let _second = journal.sign_in(UserId::new("bob")).unwrap();

        assert_eq!(store.listener_count(&alice), 0);
        assert!(first.next().await.is_none());
        assert_eq!(journal.session().unwrap().user(), &UserId::new("bob"));
    }

    #[tokio::test]
    async fn late_snapshot_after_teardown_is_ignored() {
        let (store, _drafts, mut journal) = journal();
        let user = UserId::new("u1");
        let mut stream = journal.sign_in(user.clone()).unwrap();
        let late = stream.next().await.unwrap().unwrap();

        let session = journal.session_mut().unwrap();
        session.teardown();
        assert!(!session.apply_snapshot(late.clone()));
        assert!(session.entries().is_empty());
        assert_eq!(store.listener_count(&user), 0);

        journal.sign_out();
        assert!(!journal.apply_snapshot(late));
    }

    #[tokio::test]
    async fn snapshot_for_another_user_is_rejected() {
        let (_store, _drafts, mut journal) = journal();
        let _stream = journal.sign_in(UserId::new("u1")).unwrap();
        let foreign = Snapshot::new(UserId::new("u2"), 1, vec![]);
        assert!(!journal.apply_snapshot(foreign));
    }

    #[tokio::test(start_paused = true)]
    async fn sign_out_stops_autosave() {
        let (_store, drafts, mut journal) = journal();
        let _stream = journal.sign_in(UserId::new("u1")).unwrap();
        let session = journal.session_mut().unwrap();
        let editor = session
            .begin_edit(None, Arc::new(MarkupBuffer::new("<p>draft</p>")))
            .unwrap();
        editor.set_title("t");

        time::sleep(Duration::from_millis(5001)).await;
        assert_eq!(drafts.writes(), 1);

        journal.sign_out();
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(drafts.writes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn new_edit_session_replaces_the_old_timer() {
        let (_store, drafts, mut journal) = journal();
        let _stream = journal.sign_in(UserId::new("u1")).unwrap();
        let session = journal.session_mut().unwrap();
        session
            .begin_edit(None, Arc::new(MarkupBuffer::new("<p>one</p>")))
            .unwrap();
        session
            .begin_edit(None, Arc::new(MarkupBuffer::new("<p>two</p>")))
            .unwrap();

        time::sleep(Duration::from_millis(5001)).await;
        assert_eq!(drafts.writes(), 1);
        assert_eq!(
            drafts.load(&UserId::new("u1")).unwrap().unwrap().content,
            "<p>two</p>"
        );
    }

    #[tokio::test]
    async fn editing_existing_entry_loads_it_from_snapshot() {
        let (_store, _drafts, mut journal) = journal();
        let mut stream = journal.sign_in(UserId::new("u1")).unwrap();
        pump(&mut journal, &mut stream).await;
        let id = journal
            .gateway()
            .create(NewEntry::new("Existing", "<p>old</p>"))
            .await
            .unwrap();
        pump(&mut journal, &mut stream).await;

        let session = journal.session_mut().unwrap();
        let editor = session
            .begin_edit(Some(&id), Arc::new(MarkupBuffer::default()))
            .unwrap();
        assert_eq!(editor.title(), "Existing");
        assert_eq!(editor.entry_id(), Some(&id));
        editor.body().set_content("<p>new</p>");
        editor.save_as_draft().await.unwrap();
        session.end_edit();

        pump(&mut journal, &mut stream).await;
        let session = journal.session().unwrap();
        assert_eq!(session.entry(&id).unwrap().content, "<p>new</p>");
    }

    #[tokio::test(start_paused = true)]
    async fn new_entry_keeps_the_supplied_body() {
        let (_store, drafts, mut journal) = journal();
        let _stream = journal.sign_in(UserId::new("u1")).unwrap();
        let editor = journal
            .session_mut()
            .unwrap()
            .begin_edit(None, Arc::new(MarkupBuffer::new("<p>started elsewhere</p>")))
            .unwrap();
        assert!(editor.entry_id().is_none());
        assert_eq!(editor.body().content(), "<p>started elsewhere</p>");

        time::sleep(Duration::from_millis(5001)).await;
        assert_eq!(
            drafts.load(&UserId::new("u1")).unwrap().unwrap().content,
            "<p>started elsewhere</p>"
        );
    }

    #[tokio::test]
    async fn snapshot_from_previous_session_is_rejected() {
        let (_store, _drafts, mut journal) = journal();
        let user = UserId::new("u1");
        let mut stream = journal.sign_in(user.clone()).unwrap();
        pump(&mut journal, &mut stream).await;
        let id = journal.gateway().create(NewEntry::new("gone soon", "")).await.unwrap();
        let stale = stream.next().await.unwrap().unwrap();
        assert!(journal.apply_snapshot(stale.clone()));

        journal.sign_out();
        let mut stream = journal.sign_in(user).unwrap();
        pump(&mut journal, &mut stream).await;
        journal.gateway().remove(&id).await.unwrap();
        pump(&mut journal, &mut stream).await;

        assert!(!journal.apply_snapshot(stale));
        assert!(journal.session().unwrap().entry(&id).is_none());
    }

    #[tokio::test]
    async fn older_revision_does_not_replace_newer() {
        let (_store, _drafts, mut journal) = journal();
        let mut stream = journal.sign_in(UserId::new("u1")).unwrap();
        let first = stream.next().await.unwrap().unwrap();
        journal.gateway().create(NewEntry::new("kept", "")).await.unwrap();
        let second = stream.next().await.unwrap().unwrap();

        assert!(journal.apply_snapshot(second));
        assert!(!journal.apply_snapshot(first));
        let session = journal.session().unwrap();
        assert_eq!(session.entries().len(), 1);
        assert_eq!(session.snapshot().unwrap().revision(), 2);
    }

    #[tokio::test]
    async fn repeated_snapshot_leaves_views_unchanged() {
        let (_store, _drafts, mut journal) = journal();
        let mut stream = journal.sign_in(UserId::new("u1")).unwrap();
        pump(&mut journal, &mut stream).await;
        journal
            .gateway()
            .create(NewEntry::new("Walk", "<p>long walk</p>").with_moods(["calm"]))
            .await
            .unwrap();
        let snapshot = stream.next().await.unwrap().unwrap();

        assert!(journal.apply_snapshot(snapshot.clone()));
        let session = journal.session_mut().unwrap();
        let before: Vec<EntryId> = session.visible_entries().iter().map(|e| e.id.clone()).collect();
        let stats_before = session.stats();

        assert!(journal.apply_snapshot(snapshot));
        let session = journal.session_mut().unwrap();
        let after: Vec<EntryId> = session.visible_entries().iter().map(|e| e.id.clone()).collect();
        assert_eq!(after, before);
        assert_eq!(session.stats(), stats_before);
        assert_eq!(stats_before.total_words, 2);
    }

    #[tokio::test]
    async fn delete_then_snapshot_removes_entry() {
        let (_store, _drafts, mut journal) = journal();
        let mut stream = journal.sign_in(UserId::new("u1")).unwrap();
        pump(&mut journal, &mut stream).await;
        let id = journal.gateway().create(NewEntry::new("bye", "")).await.unwrap();
        pump(&mut journal, &mut stream).await;

        journal.session().unwrap().delete_entry(&id).await.unwrap();
        pump(&mut journal, &mut stream).await;
        assert!(journal.session().unwrap().entry(&id).is_none());
        journal.session().unwrap().delete_entry(&id).await.unwrap();
    }
}
