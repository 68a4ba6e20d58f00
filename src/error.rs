//! Error types for log construction, queries and entry stores.

use crate::entry::{EntryId, SubjectKey};

/// Errors surfaced by [`ProjectLog`](crate::ProjectLog) and entry
/// construction.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The entry is malformed and was rejected before reaching a store.
    #[error("invalid log entry: {0}")]
    InvalidEntry(String),

    /// A point query needs at least one matching entry and found none.
    ///
    /// Callers usually treat this as "no history".
    #[error("no log entry for {0}")]
    NoSuchEntry(SubjectKey),

    /// [`ProjectLog::next_unprocessed`](crate::ProjectLog::next_unprocessed)
    /// was called with nothing pending.
    #[error("no unprocessed log entries")]
    EmptyQueue,

    /// The store failed. Passed through unchanged; no retries are attempted.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors reported by [`EntryStore`](crate::EntryStore) implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An entry with this id is already stored.
    #[error("duplicate log entry id: {0}")]
    DuplicateEntry(EntryId),

    /// No entry with this id is stored.
    #[error("unknown log entry id: {0}")]
    UnknownEntry(EntryId),

    /// A complete record in the log file could not be decoded.
    #[error("corrupt record at byte offset {offset}: {source}")]
    Corrupt {
        /// Byte offset where the bad line starts.
        offset: u64,
        /// The decoding failure.
        #[source]
        source: serde_json::Error,
    },

    /// A thread panicked while holding the store's lock.
    #[error("store lock poisoned")]
    Poisoned,

    /// Failure from an external backend (database, remote service).
    #[error("store backend error: {0}")]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        StoreError::Poisoned
    }
}
