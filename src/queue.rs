//! The queue of entries received but not yet integrated.
//!
//! An entry moves from unprocessed to processed exactly once and never
//! back. Nothing is removed from the store; the queue is a view over it.

use crate::engine::ProjectLog;
use crate::entry::{EntryId, LogAction, LogEntry, SubjectKey};
use crate::error::Error;
use crate::store::EntryStore;

impl<S: EntryStore> ProjectLog<S> {
    /// All unprocessed entries, oldest first.
    pub fn unprocessed(&self) -> Result<Vec<LogEntry>, Error> {
        Ok(self
            .fetch_all(true)?
            .into_iter()
            .filter(|e| !e.is_processed())
            .collect())
    }

    /// Unprocessed entries under `key`, oldest first.
    pub fn unprocessed_of(&self, key: &SubjectKey) -> Result<Vec<LogEntry>, Error> {
        Ok(self
            .fetch(key, &LogAction::ALL, true)?
            .into_iter()
            .filter(|e| !e.is_processed())
            .collect())
    }

    /// The oldest unprocessed entry.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyQueue`] if everything is processed.
    pub fn next_unprocessed(&self) -> Result<LogEntry, Error> {
        self.fetch_all(true)?
            .into_iter()
            .find(|e| !e.is_processed())
            .ok_or(Error::EmptyQueue)
    }

    /// Whether anything under `key` is still unprocessed.
    pub fn has_unprocessed(&self, key: &SubjectKey) -> Result<bool, Error> {
        Ok(self
            .fetch(key, &LogAction::ALL, true)?
            .iter()
            .any(|e| !e.is_processed()))
    }

    /// Mark an entry as integrated. Repeating the call is a no-op.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownEntry`](crate::StoreError::UnknownEntry) if the
    /// store has no such entry.
    pub fn set_processed(&self, id: EntryId) -> Result<(), Error> {
        Ok(self.store().mark_processed(id)?)
    }
}
