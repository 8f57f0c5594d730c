//! Error types for the journal engine.

use thiserror::Error;

/// Result type alias for journal operations.
pub type Result<T> = std::result::Result<T, JournalError>;

/// Failures reported by a remote store backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The addressed document does not exist
    #[error("document not found: {0}")]
    NotFound(String),

    /// The backend refused the request for this identity
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Network or service failure
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// Errors surfaced by the journal engine to its callers.
#[derive(Debug, Error)]
pub enum JournalError {
    /// A mutation was attempted while nobody is signed in
    #[error("no authenticated user")]
    NoUserContext,

    /// Save or publish attempted with a blank title and blank content
    #[error("entry has no content to save")]
    EmptyContentRejected,

    /// A create/update/delete call to the remote store failed
    #[error("remote {operation} failed: {source}")]
    RemoteWriteFailed {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    /// A one-shot read from the remote store failed
    #[error("remote {operation} failed: {source}")]
    RemoteReadFailed {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    /// The live subscription errored or terminated
    #[error("entry subscription failed: {0}")]
    RemoteSubscriptionFailed(String),

    /// Unknown sort key
    #[error("invalid sort key: {0}")]
    InvalidSortKey(String),

    /// Local draft persistence failed
    #[error("draft storage error: {0}")]
    DraftStorage(String),
}

impl JournalError {
    pub fn write_failed(operation: &'static str, source: StoreError) -> Self {
        Self::RemoteWriteFailed { operation, source }
    }

    pub fn read_failed(operation: &'static str, source: StoreError) -> Self {
        Self::RemoteReadFailed { operation, source }
    }

    /// True for errors raised locally before any remote call was made.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::NoUserContext | Self::EmptyContentRejected)
    }
}

impl From<std::io::Error> for JournalError {
    fn from(err: std::io::Error) -> Self {
        Self::DraftStorage(err.to_string())
    }
}

impl From<serde_json::Error> for JournalError {
    fn from(err: serde_json::Error) -> Self {
        Self::DraftStorage(err.to_string())
    }
}
