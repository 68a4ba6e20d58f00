//! Pure reducers deriving object state from log entries.
//!
//! Point reducers ([`delete_state`], [`last_version`], [`lock`]) pick the
//! most recent relevant entry and accept entries in any order. Folding
//! reducers ([`tag_reducer`], [`existence_reducer`]) must see entries in log
//! order; sort with [`ordering::sort`] first.

use crate::entry::{LogAction, LogEntry, ObjectRef, Subject, Tag};
use crate::ordering;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// A pure function that folds an entry into state.
///
/// Reducers receive owned state and return owned state. They must be pure
/// (no I/O, no side effects) and match every [`LogAction`] explicitly so a
/// new kind cannot be ignored by accident.
///
/// # Examples
///
/// ```
/// use projectfold::{LogEntry, ReduceFn};
///
/// fn count(state: u64, _entry: &LogEntry) -> u64 {
///     state + 1
/// }
///
/// let reducer: ReduceFn<u64> = count;
/// ```
pub type ReduceFn<S> = fn(S, &LogEntry) -> S;

/// Apply `reducer` to each entry in turn, starting from `init`.
pub fn fold<'a, S, I>(init: S, entries: I, reducer: ReduceFn<S>) -> S
where
    I: IntoIterator<Item = &'a LogEntry>,
{
    entries.into_iter().fold(init, reducer)
}

/// `Some(true)` for a delete, `Some(false)` for a new version.
fn existence_effect(action: LogAction) -> Option<bool> {
    match action {
        LogAction::ObjectNewVersion => Some(false),
        LogAction::ObjectDelete => Some(true),
        LogAction::ProjectCreated
        | LogAction::ObjectLock
        | LogAction::ObjectUnlock
        | LogAction::TagAdd
        | LogAction::TagRemove
        | LogAction::StartTrustingMember
        | LogAction::StopTrustingMember => None,
    }
}

/// `Some(true)` for a lock, `Some(false)` for an unlock.
fn lock_effect(action: LogAction) -> Option<bool> {
    match action {
        LogAction::ObjectLock => Some(true),
        LogAction::ObjectUnlock => Some(false),
        LogAction::ProjectCreated
        | LogAction::ObjectNewVersion
        | LogAction::ObjectDelete
        | LogAction::TagAdd
        | LogAction::TagRemove
        | LogAction::StartTrustingMember
        | LogAction::StopTrustingMember => None,
    }
}

/// `Some(true)` for an add, `Some(false)` for a remove.
fn tag_effect(action: LogAction) -> Option<bool> {
    match action {
        LogAction::TagAdd => Some(true),
        LogAction::TagRemove => Some(false),
        LogAction::ProjectCreated
        | LogAction::ObjectNewVersion
        | LogAction::ObjectDelete
        | LogAction::ObjectLock
        | LogAction::ObjectUnlock
        | LogAction::StartTrustingMember
        | LogAction::StopTrustingMember => None,
    }
}

fn latest_with_effect(
    entries: &[LogEntry],
    effect: fn(LogAction) -> Option<bool>,
) -> Option<(&LogEntry, bool)> {
    let last = ordering::latest(entries.iter().filter(|e| effect(e.action()).is_some()))?;
    effect(last.action()).map(|value| (last, value))
}

/// Tri-state delete status of one object.
///
/// `Some(true)` if the latest version-or-delete entry is a delete,
/// `Some(false)` if it is a new version, `None` if there is neither.
pub fn delete_state(entries: &[LogEntry]) -> Option<bool> {
    latest_with_effect(entries, existence_effect).map(|(_, deleted)| deleted)
}

/// The latest new-version entry, unless a delete came after it.
///
/// Unlike [`delete_state`] this never returns the delete entry itself: a
/// deleted object has no current version.
pub fn last_version(entries: &[LogEntry]) -> Option<&LogEntry> {
    match latest_with_effect(entries, existence_effect)? {
        (entry, false) => Some(entry),
        (_, true) => None,
    }
}

/// The latest new-version entry, ignoring deletes.
pub fn newest_version(entries: &[LogEntry]) -> Option<&LogEntry> {
    ordering::latest(versions(entries))
}

/// New-version entries only, in the order given.
pub fn versions(entries: &[LogEntry]) -> impl Iterator<Item = &LogEntry> {
    entries
        .iter()
        .filter(|e| existence_effect(e.action()) == Some(false))
}

/// The lock entry if the latest lock-or-unlock entry is a lock.
///
/// Says nothing about whether the object still exists.
pub fn lock(entries: &[LogEntry]) -> Option<&LogEntry> {
    match latest_with_effect(entries, lock_effect)? {
        (entry, true) => Some(entry),
        (_, false) => None,
    }
}

/// Tags currently attached to one object, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet(BTreeMap<String, Tag>);

impl TagSet {
    pub fn into_tags(self) -> BTreeSet<Tag> {
        self.0.into_values().collect()
    }

    /// Whether a tag called `name` is attached.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Number of attached tags.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` when no tag is attached.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Add on [`LogAction::TagAdd`], remove on [`LogAction::TagRemove`].
///
/// Re-adding a present tag and removing an absent one are no-ops.
pub fn tag_reducer(mut state: TagSet, entry: &LogEntry) -> TagSet {
    if let (Some(present), Subject::Tag(tag)) = (tag_effect(entry.action()), entry.subject()) {
        if present {
            state.0.insert(tag.name.clone(), tag.clone());
        } else {
            state.0.remove(&tag.name);
        }
    }
    state
}

/// Latest known delete status of every object seen in the log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectStates(BTreeMap<Uuid, (ObjectRef, bool)>);

impl ObjectStates {
    /// Objects whose latest version-or-delete entry is a new version.
    pub fn existing(&self) -> impl Iterator<Item = &ObjectRef> {
        self.0
            .values()
            .filter(|(_, deleted)| !deleted)
            .map(|(object, _)| object)
    }

    /// Delete status of one object, as in [`delete_state`].
    pub fn delete_state(&self, id: &Uuid) -> Option<bool> {
        self.0.get(id).map(|(_, deleted)| *deleted)
    }
}

/// Track delete status per object across the whole log.
pub fn existence_reducer(mut state: ObjectStates, entry: &LogEntry) -> ObjectStates {
    if let (Some(deleted), Subject::Object(object)) = (existence_effect(entry.action()), entry.subject()) {
        state.0.insert(object.id, (object.clone(), deleted));
    }
    state
}
