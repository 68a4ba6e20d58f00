//! The total order over log entries.
//!
//! Entries are ordered by timestamp, then by id. Ids are random, so the
//! tie-break is arbitrary but identical on every peer holding the same
//! entries. Clock skew between peers is not compensated.

use crate::entry::LogEntry;
use std::cmp::Ordering;

/// Compare two entries by `(timestamp, id)`.
///
/// Only equal for the same entry id at the same timestamp.
pub fn compare(a: &LogEntry, b: &LogEntry) -> Ordering {
    a.timestamp()
        .cmp(&b.timestamp())
        .then_with(|| a.id().cmp(&b.id()))
}

/// Sort entries oldest first.
pub fn sort(entries: &mut [LogEntry]) {
    entries.sort_by(compare);
}

/// The most recent entry, if any. Input order does not matter.
pub fn latest<'a, I>(entries: I) -> Option<&'a LogEntry>
where
    I: IntoIterator<Item = &'a LogEntry>,
{
    entries.into_iter().max_by(|a, b| compare(a, b))
}

/// The oldest entry, if any. Input order does not matter.
pub fn earliest<'a, I>(entries: I) -> Option<&'a LogEntry>
where
    I: IntoIterator<Item = &'a LogEntry>,
{
    entries.into_iter().min_by(|a, b| compare(a, b))
}
