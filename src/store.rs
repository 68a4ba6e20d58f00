//! The entry store contract and an in-memory implementation.

use crate::entry::{EntryId, LogAction, LogEntry, SubjectKey};
use crate::error::StoreError;
use crate::ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Durable home of a project's log entries.
///
/// Implementations must make `append` and `mark_processed` atomic and
/// linearizable with respect to each other: no partial entries, no lost
/// processed flags. Query results are returned oldest first.
///
/// All methods take `&self` so one store can be shared between the local
/// action path and the remote delivery path.
pub trait EntryStore: Send + Sync {
    /// Persist one entry. Rejects an id that is already stored.
    fn append(&self, entry: LogEntry) -> Result<EntryId, StoreError>;

    /// Entries under `key` whose action is one of `kinds`.
    ///
    /// Unprocessed entries are left out unless `include_unprocessed` is set.
    fn query_by_subject(
        &self,
        key: &SubjectKey,
        kinds: &[LogAction],
        include_unprocessed: bool,
    ) -> Result<Vec<LogEntry>, StoreError>;

    /// Every entry in the log.
    fn query_all(&self, include_unprocessed: bool) -> Result<Vec<LogEntry>, StoreError>;

    /// Flag an entry as processed. Marking an already processed entry is a
    /// no-op.
    fn mark_processed(&self, id: EntryId) -> Result<(), StoreError>;

    /// Look up one entry by id.
    fn get(&self, id: EntryId) -> Result<Option<LogEntry>, StoreError> {
        Ok(self.query_all(true)?.into_iter().find(|e| e.id() == id))
    }
}

impl<S: EntryStore + ?Sized> EntryStore for &S {
    fn append(&self, entry: LogEntry) -> Result<EntryId, StoreError> {
        (**self).append(entry)
    }

    fn query_by_subject(
        &self,
        key: &SubjectKey,
        kinds: &[LogAction],
        include_unprocessed: bool,
    ) -> Result<Vec<LogEntry>, StoreError> {
        (**self).query_by_subject(key, kinds, include_unprocessed)
    }

    fn query_all(&self, include_unprocessed: bool) -> Result<Vec<LogEntry>, StoreError> {
        (**self).query_all(include_unprocessed)
    }

    fn mark_processed(&self, id: EntryId) -> Result<(), StoreError> {
        (**self).mark_processed(id)
    }

    fn get(&self, id: EntryId) -> Result<Option<LogEntry>, StoreError> {
        (**self).get(id)
    }
}

impl<S: EntryStore + ?Sized> EntryStore for Arc<S> {
    fn append(&self, entry: LogEntry) -> Result<EntryId, StoreError> {
        (**self).append(entry)
    }

    fn query_by_subject(
        &self,
        key: &SubjectKey,
        kinds: &[LogAction],
        include_unprocessed: bool,
    ) -> Result<Vec<LogEntry>, StoreError> {
        (**self).query_by_subject(key, kinds, include_unprocessed)
    }

    fn query_all(&self, include_unprocessed: bool) -> Result<Vec<LogEntry>, StoreError> {
        (**self).query_all(include_unprocessed)
    }

    fn mark_processed(&self, id: EntryId) -> Result<(), StoreError> {
        (**self).mark_processed(id)
    }

    fn get(&self, id: EntryId) -> Result<Option<LogEntry>, StoreError> {
        (**self).get(id)
    }
}

/// Entries plus an id index, kept in append order.
#[derive(Debug, Default)]
pub(crate) struct EntryIndex {
    entries: Vec<LogEntry>,
    by_id: HashMap<EntryId, usize>,
}

impl EntryIndex {
    pub(crate) fn contains(&self, id: &EntryId) -> bool {
        self.by_id.contains_key(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `false` if the id was already present.
    pub(crate) fn insert(&mut self, entry: LogEntry) -> bool {
        if self.by_id.contains_key(&entry.id()) {
            return false;
        }
        self.by_id.insert(entry.id(), self.entries.len());
        self.entries.push(entry);
        true
    }

    /// `None` for an unknown id, otherwise whether the flag changed.
    pub(crate) fn mark_processed(&mut self, id: &EntryId) -> Option<bool> {
        let pos = *self.by_id.get(id)?;
        Some(self.entries[pos].mark_processed())
    }

    pub(crate) fn get(&self, id: &EntryId) -> Option<&LogEntry> {
        self.by_id.get(id).map(|&pos| &self.entries[pos])
    }

    /// Matching entries, cloned and sorted into log order.
    pub(crate) fn select<F>(&self, include_unprocessed: bool, pred: F) -> Vec<LogEntry>
    where
        F: Fn(&LogEntry) -> bool,
    {
        let mut out: Vec<LogEntry> = self
            .entries
            .iter()
            .filter(|e| include_unprocessed || e.is_processed())
            .filter(|&e| pred(e))
            .cloned()
            .collect();
        ordering::sort(&mut out);
        out
    }

    pub(crate) fn select_subject(
        &self,
        key: &SubjectKey,
        kinds: &[LogAction],
        include_unprocessed: bool,
    ) -> Vec<LogEntry> {
        self.select(include_unprocessed, |e| {
            kinds.contains(&e.action()) && key.matches(e.subject())
        })
    }
}

/// In-memory entry store backed by a `RwLock`.
///
/// Nothing survives the process. Useful for tests and for peers that keep
/// a project only for the length of a session.
#[derive(Debug, Default)]
pub struct MemoryStore {
    index: RwLock<EntryIndex>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, processed or not.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.index.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl EntryStore for MemoryStore {
    fn append(&self, entry: LogEntry) -> Result<EntryId, StoreError> {
        let id = entry.id();
        let mut index = self.index.write()?;
        if !index.insert(entry) {
            return Err(StoreError::DuplicateEntry(id));
        }
        log::debug!("appended log entry {id}");
        Ok(id)
    }

    fn query_by_subject(
        &self,
        key: &SubjectKey,
        kinds: &[LogAction],
        include_unprocessed: bool,
    ) -> Result<Vec<LogEntry>, StoreError> {
        Ok(self.index.read()?.select_subject(key, kinds, include_unprocessed))
    }

    fn query_all(&self, include_unprocessed: bool) -> Result<Vec<LogEntry>, StoreError> {
        Ok(self.index.read()?.select(include_unprocessed, |_| true))
    }

    fn mark_processed(&self, id: EntryId) -> Result<(), StoreError> {
        match self.index.write()?.mark_processed(&id) {
            None => Err(StoreError::UnknownEntry(id)),
            Some(changed) => {
                if changed {
                    log::debug!("marked log entry {id} processed");
                }
                Ok(())
            }
        }
    }

    fn get(&self, id: EntryId) -> Result<Option<LogEntry>, StoreError> {
        Ok(self.index.read()?.get(&id).cloned())
    }
}
