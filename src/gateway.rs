use log::debug;
use std::sync::Arc;

use crate::entry::{Entry, EntryId, EntryPatch, NewEntry, UserId};
use crate::error::{JournalError, Result};
use crate::store::RemoteStore;

/// Sends entry mutations to the remote store on behalf of one user.
///
/// Validation happens before any remote call. On failure nothing local is
/// changed; the next snapshot stays the source of truth.
#[derive(Clone)]
pub struct EntryGateway {
    store: Arc<dyn RemoteStore>,
    user: Option<UserId>,
}

impl EntryGateway {
    pub fn for_user(store: Arc<dyn RemoteStore>, user: UserId) -> Self {
        EntryGateway {
            store,
            user: Some(user),
        }
    }

    /// A gateway with nobody signed in; every call fails with `NoUserContext`.
    pub fn signed_out(store: Arc<dyn RemoteStore>) -> Self {
        EntryGateway { store, user: None }
    }

    pub fn user(&self) -> Result<&UserId> {
        self.user.as_ref().ok_or(JournalError::NoUserContext)
    }

    pub async fn create(&self, fields: NewEntry) -> Result<EntryId> {
        let user = self.user()?;
        let id = self
            .store
            .create(user, fields)
            .await
            .map_err(|e| JournalError::write_failed("create", e))?;
        debug!("created entry {} for {}", id, user);
        Ok(id)
    }

    /// Changes only the fields present in `patch`; the timestamp is kept.
    pub async fn update(&self, id: &EntryId, patch: EntryPatch) -> Result<()> {
        let user = self.user()?;
        if patch.is_empty() {
            return Ok(());
        }
        self.store
            .update(user, id, patch)
            .await
            .map_err(|e| JournalError::write_failed("update", e))?;
        debug!("updated entry {} for {}", id, user);
        Ok(())
    }

    /// Merge-writes every field and refreshes the timestamp when `id` is
    /// given, otherwise creates a new entry. Used for publishing and for
    /// saves that replace the content.
    pub async fn upsert_publish(&self, id: Option<&EntryId>, fields: NewEntry) -> Result<EntryId> {
        let user = self.user()?;
        if !fields.has_meaningful_content() {
            return Err(JournalError::EmptyContentRejected);
        }
        match id {
            Some(id) => {
                self.store
                    .merge(user, id, fields.into_patch())
                    .await
                    .map_err(|e| JournalError::write_failed("merge", e))?;
                debug!("merged entry {} for {}", id, user);
                Ok(id.clone())
            }
            None => self.create(fields).await,
        }
    }

    /// Deleting an entry that is already gone succeeds.
    pub async fn remove(&self, id: &EntryId) -> Result<()> {
        let user = self.user()?;
        self.store
            .delete(user, id)
            .await
            .map_err(|e| JournalError::write_failed("delete", e))?;
        debug!("deleted entry {} for {}", id, user);
        Ok(())
    }

    pub async fn get_once(&self, id: &EntryId) -> Result<Option<Entry>> {
        let user = self.user()?;
        self.store
            .get_once(user, id)
            .await
            .map_err(|e| JournalError::read_failed("get", e))
    }

    /// One-shot read of the whole collection, newest first.
    pub async fn list(&self) -> Result<Vec<Entry>> {
        let user = self.user()?;
        self.store
            .list(user)
            .await
            .map_err(|e| JournalError::read_failed("list", e))
    }
}
