//! Live journal entry sync with derived views.
//!
//! The engine mirrors one user's journal entries from a remote document store,
//! derives filtered/sorted lists and aggregate stats from every snapshot, and
//! autosaves in-progress edits to a local draft store.

pub mod aggregate;
pub mod auth;
pub mod config;
pub mod draft;
pub mod editor;
pub mod entry;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod memory_store;
pub mod session;
pub mod settings;
pub mod store;
pub mod streak;
pub mod sync;

pub use aggregate::{compute_stats, JournalStats, StatsAggregator};
pub use auth::{auth_changes, IdentityProvider, InMemoryIdentity};
pub use config::JournalConfig;
pub use draft::{Autosave, DraftRecord, DraftStore, FileDraftStore, MemoryDraftStore};
pub use editor::{EditSession, MarkupBuffer, RichTextBuffer};
pub use entry::{Entry, EntryId, EntryPatch, EntrySummary, NewEntry, UserId};
pub use error::{JournalError, Result, StoreError};
pub use filter::{view, SortKey, ViewQuery};
pub use gateway::EntryGateway;
pub use memory_store::InMemoryStore;
pub use session::{Journal, JournalSession};
pub use settings::{load_theme, save_theme, Theme, UserSettings};
pub use store::{RemoteStore, StoreEvent, SubscriptionHandle};
pub use streak::{compute_streak, compute_streak_on};
pub use sync::{EntrySynchronizer, Snapshot, SnapshotStream, SyncStatus};
