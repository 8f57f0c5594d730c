//! Edit session: title and rich-text buffers, draft saves, publishing and
//! the autosave timer.

use log::info;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::draft::{Autosave, DraftRecord, DraftSource, DraftStore};
use crate::entry::{strip_markup, Entry, EntryId, EntryPatch, NewEntry};
use crate::error::{JournalError, Result};
use crate::gateway::EntryGateway;

/// Capability over an external rich-text editing surface.
pub trait RichTextBuffer: Send + Sync {
    /// Current content as markup.
    fn content(&self) -> String;
    fn set_content(&self, markup: &str);
    fn plain_text(&self) -> String {
        strip_markup(&self.content())
    }
}

/// Plain in-memory markup buffer.
#[derive(Debug, Default)]
pub struct MarkupBuffer {
    markup: Mutex<String>,
}

impl MarkupBuffer {
    pub fn new(markup: impl Into<String>) -> Self {
        MarkupBuffer {
            markup: Mutex::new(markup.into()),
        }
    }
}

impl RichTextBuffer for MarkupBuffer {
    fn content(&self) -> String {
        self.markup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_content(&self, markup: &str) {
        *self.markup.lock().unwrap_or_else(PoisonError::into_inner) = markup.to_string();
    }
}

struct EditorFields {
    title: Mutex<String>,
    body: Arc<dyn RichTextBuffer>,
}

impl DraftSource for EditorFields {
    fn capture(&self) -> (String, String) {
        let title = self.title.lock().unwrap_or_else(PoisonError::into_inner).clone();
        (title, self.body.content())
    }
}

pub struct EditSession {
    gateway: EntryGateway,
    drafts: Arc<dyn DraftStore>,
    fields: Arc<EditorFields>,
    entry_id: Option<EntryId>,
    autosave: Option<Autosave>,
    autosave_interval: Duration,
}

impl EditSession {
    pub fn new(
        gateway: EntryGateway,
        drafts: Arc<dyn DraftStore>,
        body: Arc<dyn RichTextBuffer>,
        autosave_interval: Duration,
    ) -> Self {
        EditSession {
            gateway,
            drafts,
            fields: Arc::new(EditorFields {
                title: Mutex::new(String::new()),
                body,
            }),
            entry_id: None,
            autosave: None,
            autosave_interval,
        }
    }

    /// Fills the buffers from `entry`, or clears them for a new entry.
    pub fn load_entry(&mut self, entry: Option<&Entry>) {
        self.entry_id = entry.map(|e| e.id.clone());
        self.set_title(entry.map_or("", |e| e.title.as_str()));
        self.fields
            .body
            .set_content(entry.map_or("", |e| e.content.as_str()));
    }

    pub fn entry_id(&self) -> Option<&EntryId> {
        self.entry_id.as_ref()
    }

    pub fn title(&self) -> String {
        self.fields
            .title
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_title(&self, title: &str) {
        *self
            .fields
            .title
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = title.to_string();
    }

    pub fn body(&self) -> &Arc<dyn RichTextBuffer> {
        &self.fields.body
    }

    /// Restarts the autosave timer for the signed-in user.
    pub fn start_autosave(&mut self) -> Result<()> {
        self.stop_autosave();
        let user = self.gateway.user()?.clone();
        let source: Arc<dyn DraftSource> = self.fields.clone();
        self.autosave = Some(Autosave::start(
            user,
            source,
            self.drafts.clone(),
            self.autosave_interval,
        ));
        Ok(())
    }

    pub fn stop_autosave(&mut self) {
        if let Some(mut autosave) = self.autosave.take() {
            autosave.stop();
        }
    }

    pub fn is_autosaving(&self) -> bool {
        self.autosave.as_ref().is_some_and(Autosave::is_running)
    }

    pub fn recovered_draft(&self) -> Result<Option<DraftRecord>> {
        let user = self.gateway.user()?;
        self.drafts.load(user)
    }

    /// Copies the stored draft, if any, into the buffers.
    pub fn restore_draft(&mut self) -> Result<bool> {
        match self.recovered_draft()? {
            Some(draft) => {
                self.set_title(&draft.title);
                self.fields.body.set_content(&draft.content);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn current_fields(&self) -> NewEntry {
        let (title, content) = self.fields.capture();
        NewEntry::new(title, content)
    }

    /// Saves the buffers as a private draft, creating the entry on first save.
    pub async fn save_as_draft(&mut self) -> Result<EntryId> {
        self.gateway.user()?;
        let fields = self.current_fields();
        if !fields.has_meaningful_content() {
            return Err(JournalError::EmptyContentRejected);
        }

        match &self.entry_id {
            Some(id) => {
                let patch = EntryPatch::default()
                    .title(fields.title)
                    .content(fields.content)
                    .is_draft(true);
                self.gateway.update(id, patch).await?;
                Ok(id.clone())
            }
            None => {
                let id = self.gateway.create(fields).await?;
                self.entry_id = Some(id.clone());
                Ok(id)
            }
        }
    }

    /// Publishes the buffers with `mood_tags`, refreshing the timestamp.
    pub async fn publish(&mut self, mood_tags: Vec<String>) -> Result<EntryId> {
        let fields = self.current_fields().with_moods(mood_tags).published();
        let id = self
            .gateway
            .upsert_publish(self.entry_id.as_ref(), fields)
            .await?;
        info!("published entry {}", id);
        self.entry_id = Some(id.clone());
        Ok(id)
    }

    /// Stops autosave; the buffers are left as they are.
    pub fn close(mut self) {
        self.stop_autosave();
    }
}

impl Drop for EditSession {
    fn drop(&mut self) {
        self.stop_autosave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::MemoryDraftStore;
    use crate::entry::UserId;
    use crate::memory_store::InMemoryStore;
    use crate::store::RemoteStore;
    use tokio::time;

    const TICK: Duration = Duration::from_millis(5000);

    struct Fixture {
        store: Arc<InMemoryStore>,
        drafts: Arc<MemoryDraftStore>,
        session: EditSession,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let drafts = Arc::new(MemoryDraftStore::new());
        let gateway = EntryGateway::for_user(store.clone(), UserId::new("u1"));
        let session = EditSession::new(gateway, drafts.clone(), Arc::new(MarkupBuffer::default()), TICK);
        Fixture {
            store,
            drafts,
            session,
        }
    }

    #[tokio::test]
    async fn first_draft_save_creates_then_updates() {
        let Fixture { store, session: mut editor, .. } = fixture();
        editor.set_title("Day one");
        editor.body().set_content("<p>hello</p>");

        let id = editor.save_as_draft().await.unwrap();
        assert_eq!(editor.entry_id(), Some(&id));

        editor.body().set_content("<p>hello again</p>");
        let same = editor.save_as_draft().await.unwrap();
        assert_eq!(same, id);

        let entries = store.list(&UserId::new("u1")).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content, "<p>hello again</p>");
        assert!(entries[0].is_draft);
    }

    #[tokio::test]
    async fn publish_marks_entry_public_with_moods() {
        let Fixture { store, session: mut editor, .. } = fixture();
        editor.set_title("Sunny");
        let draft_id = editor.save_as_draft().await.unwrap();

        let id = editor.publish(vec!["happy".into()]).await.unwrap();
        assert_eq!(id, draft_id);
        let entry = store.get_once(&UserId::new("u1"), &id).await.unwrap().unwrap();
        assert!(!entry.is_draft);
        assert_eq!(entry.mood_tags, vec!["happy".to_string()]);
    }

    #[tokio::test]
    async fn failed_first_save_leaves_entry_unassigned() {
        let Fixture { store, session: mut editor, .. } = fixture();
        editor.set_title("offline");
        store.fail_requests(true);
        assert!(matches!(
            editor.save_as_draft().await,
            Err(JournalError::RemoteWriteFailed { .. })
        ));
        assert!(editor.entry_id().is_none());
        assert!(editor.publish(vec![]).await.is_err());
        assert!(editor.entry_id().is_none());
    }

    #[tokio::test]
    async fn blank_buffers_are_not_saved() {
        let Fixture { session: mut editor, .. } = fixture();
        editor.body().set_content("<p>   </p>");
        assert!(matches!(
            editor.save_as_draft().await,
            Err(JournalError::EmptyContentRejected)
        ));
        assert!(matches!(
            editor.publish(vec!["calm".into()]).await,
            Err(JournalError::EmptyContentRejected)
        ));
    }

    #[tokio::test]
    async fn signed_out_editor_reports_missing_user() {
        let store = Arc::new(InMemoryStore::new());
        let mut editor = EditSession::new(
            EntryGateway::signed_out(store),
            Arc::new(MemoryDraftStore::new()),
            Arc::new(MarkupBuffer::new("<p>text</p>")),
            TICK,
        );
        assert!(matches!(editor.save_as_draft().await, Err(JournalError::NoUserContext)));
        assert!(matches!(editor.start_autosave(), Err(JournalError::NoUserContext)));
    }

    #[tokio::test(start_paused = true)]
    async fn autosave_captures_buffers_until_closed() {
        let Fixture { drafts, session: mut editor, .. } = fixture();
        editor.set_title("Draft");
        editor.body().set_content("<p>v1</p>");
        editor.start_autosave().unwrap();
        assert!(editor.is_autosaving());

        time::sleep(TICK + Duration::from_millis(1)).await;
        assert_eq!(drafts.writes(), 1);
        editor.body().set_content("<p>v2</p>");
        time::sleep(TICK).await;
        assert_eq!(drafts.writes(), 2);
        assert_eq!(
            drafts.load(&UserId::new("u1")).unwrap().unwrap().content,
            "<p>v2</p>"
        );

        editor.close();
        time::sleep(TICK * 5).await;
        assert_eq!(drafts.writes(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_autosave_keeps_a_single_timer() {
        let Fixture { drafts, session: mut editor, .. } = fixture();
        editor.set_title("x");
        editor.start_autosave().unwrap();
        editor.start_autosave().unwrap();
        time::sleep(TICK + Duration::from_millis(1)).await;
        assert_eq!(drafts.writes(), 1);
        editor.stop_autosave();
        assert!(!editor.is_autosaving());
    }

    #[tokio::test]
    async fn restores_recovered_draft_into_buffers() {
        let Fixture { drafts, session: mut editor, .. } = fixture();
        drafts
            .save(&UserId::new("u1"), &DraftRecord::new("Recovered", "<p>lost work</p>"))
            .unwrap();
        assert!(editor.restore_draft().unwrap());
        assert_eq!(editor.title(), "Recovered");
        assert_eq!(editor.body().plain_text(), "lost work");
    }

    #[tokio::test]
    async fn loading_an_entry_fills_buffers() {
        let Fixture { session: mut editor, .. } = fixture();
        let entry = Entry::new(EntryId::new("e1"), NewEntry::new("Old", "<p>text</p>"), None);
        editor.load_entry(Some(&entry));
        assert_eq!(editor.entry_id(), Some(&EntryId::new("e1")));
        assert_eq!(editor.title(), "Old");
        assert_eq!(editor.body().content(), "<p>text</p>");

        editor.load_entry(None);
        assert!(editor.entry_id().is_none());
        assert_eq!(editor.title(), "");
    }
}
