mod common;

use common::{me, uuid};
use projectfold::{EntryStore, FileStore, LogEntry, ObjectRef, ProjectLog, DEFAULT_FILE_NAME};
use std::fs;
use std::io::Write;
use tempfile::tempdir;

fn file() -> ObjectRef {
    ObjectRef::file(uuid(1), "a.txt")
}

/// Crash during append leaves a partial line at EOF.
/// Complete records before it must be intact, and the partial line is dropped.
#[test]
fn test_crash_during_append() {
    let dir = tempdir().unwrap();
    let good_len = {
        let store = FileStore::open(dir.path()).unwrap();
        for comment in ["v1", "v2", "v3"] {
            store
                .append(LogEntry::new_version(file(), me()).unwrap().with_comment(comment))
                .unwrap();
        }
        store.log_size().unwrap()
    };

    // Simulate a crash mid-write: no trailing newline.
    {
        let mut f = fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join(DEFAULT_FILE_NAME))
            .unwrap();
        write!(f, r#"{{"op":"append","entry":{{"id":"#).unwrap();
    }

    let log = ProjectLog::new(FileStore::open(dir.path()).unwrap());
    assert_eq!(log.store().log_size().unwrap(), good_len);

    let comments: Vec<_> = log
        .all_versions_of_object(&file(), true)
        .unwrap()
        .iter()
        .map(|e| e.comment().unwrap().to_string())
        .collect();
    assert_eq!(comments, ["v1", "v2", "v3"]);

    // New appends land on a clean line.
    log.append(LogEntry::delete(file(), me()).unwrap()).unwrap();
    drop(log);

    let store = FileStore::open(dir.path()).unwrap();
    assert_eq!(store.query_all(true).unwrap().len(), 4);
}

/// A crash before any newline was written leaves only garbage.
#[test]
fn test_partial_first_record() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join(DEFAULT_FILE_NAME), b"{\"op\":\"app").unwrap();

    let store = FileStore::open(dir.path()).unwrap();
    assert_eq!(store.log_size().unwrap(), 0);
    assert!(store.query_all(true).unwrap().is_empty());
    store.append(LogEntry::lock(file(), me()).unwrap()).unwrap();
    assert_eq!(store.query_all(true).unwrap().len(), 1);
}

/// A processed marker lost in a crash leaves the entry unprocessed.
#[test]
fn test_lost_processed_marker() {
    let dir = tempdir().unwrap();
    let id = {
        let store = FileStore::open(dir.path()).unwrap();
        store
            .append(LogEntry::lock(file(), me()).unwrap().with_processed(false))
            .unwrap()
    };
    {
        let mut f = fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join(DEFAULT_FILE_NAME))
            .unwrap();
        write!(f, r#"{{"op":"processed","id":"{id}"#).unwrap();
    }

    let log = ProjectLog::new(FileStore::open(dir.path()).unwrap());
    assert_eq!(log.next_unprocessed().unwrap().id(), id);
    log.set_processed(id).unwrap();
    assert!(log.unprocessed().unwrap().is_empty());
}

/// Blank lines, e.g. from a manual edit, are skipped.
#[test]
fn test_blank_lines_ignored() {
    let dir = tempdir().unwrap();
    {
        let store = FileStore::open(dir.path()).unwrap();
        store.append(LogEntry::lock(file(), me()).unwrap()).unwrap();
    }
    {
        let mut f = fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join(DEFAULT_FILE_NAME))
            .unwrap();
        writeln!(f).unwrap();
    }
    let store = FileStore::open(dir.path()).unwrap();
    store.append(LogEntry::unlock(file(), me()).unwrap()).unwrap();
    assert_eq!(store.query_all(true).unwrap().len(), 2);
}

/// A second writer crashing mid-record must not poison the shared log for
/// handles that are already open.
#[test]
fn test_partial_tail_from_other_writer() {
    let dir = tempdir().unwrap();
    let shared = || {
        FileStore::builder(dir.path())
            .lock_mode(projectfold::LockMode::PerWrite)
            .open()
            .unwrap()
    };
    let survivor = shared();
    let first = survivor
        .append(LogEntry::lock(file(), me()).unwrap().with_processed(false))
        .unwrap();
    let good_len = survivor.log_size().unwrap();

    {
        let mut f = fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join(DEFAULT_FILE_NAME))
            .unwrap();
        write!(f, r#"{{"op":"append","entr"#).unwrap();
    }
    // Readers skip the partial record.
    assert_eq!(survivor.query_all(true).unwrap().len(), 1);

    let second = survivor
        .append(LogEntry::unlock(file(), me()).unwrap())
        .unwrap();
    assert!(survivor.get(second).unwrap().is_some());
    assert!(survivor.log_size().unwrap() > good_len);

    // Marking processed also writes on a clean line.
    {
        let mut f = fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join(DEFAULT_FILE_NAME))
            .unwrap();
        write!(f, r#"{{"op":"proc"#).unwrap();
    }
    survivor.mark_processed(first).unwrap();
    assert!(survivor.get(first).unwrap().unwrap().is_processed());

    drop(survivor);
    let reopened = shared();
    let ids: Vec<_> = reopened
        .query_all(true)
        .unwrap()
        .iter()
        .map(|e| e.id())
        .collect();
    assert_eq!(ids, vec![first, second]);
    assert!(reopened.get(first).unwrap().unwrap().is_processed());
}
