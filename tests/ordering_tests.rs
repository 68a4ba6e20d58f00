mod common;

use common::{me, uuid};
use projectfold::{ordering, EntryId, LogAction, LogEntry, ObjectRef, Subject};
use std::cmp::Ordering;
use std::str::FromStr;

fn at(ts: u64, id: &str, action: LogAction) -> LogEntry {
    LogEntry::received(
        EntryId::from_str(id).unwrap(),
        ts,
        action,
        Subject::Object(ObjectRef::file(uuid(1), "a.txt")),
        me(),
    )
    .unwrap()
}

const ID_A: &str = "10000000-0000-4000-8000-000000000000";
const ID_B: &str = "20000000-0000-4000-8000-000000000000";
const ID_C: &str = "30000000-0000-4000-8000-000000000000";

#[test]
fn test_timestamp_orders_first() {
    let early = at(1, ID_C, LogAction::ObjectLock);
    let late = at(2, ID_A, LogAction::ObjectUnlock);
    assert_eq!(ordering::compare(&early, &late), Ordering::Less);
    assert_eq!(ordering::compare(&late, &early), Ordering::Greater);
}

#[test]
fn test_id_breaks_timestamp_ties() {
    let a = at(5, ID_A, LogAction::ObjectLock);
    let b = at(5, ID_B, LogAction::ObjectUnlock);
    assert_eq!(ordering::compare(&a, &b), Ordering::Less);
    assert_eq!(ordering::compare(&b, &a), Ordering::Greater);
    assert_eq!(ordering::compare(&a, &a), Ordering::Equal);
}

#[test]
fn test_sort() {
    let mut entries = vec![
        at(5, ID_B, LogAction::ObjectUnlock),
        at(9, ID_A, LogAction::ObjectLock),
        at(5, ID_A, LogAction::ObjectLock),
        at(1, ID_C, LogAction::ObjectNewVersion),
    ];
    ordering::sort(&mut entries);
    let keys: Vec<(u64, String)> = entries
        .iter()
        .map(|e| (e.timestamp(), e.id().to_string()))
        .collect();
    assert_eq!(
        keys,
        vec![
            (1, ID_C.to_string()),
            (5, ID_A.to_string()),
            (5, ID_B.to_string()),
            (9, ID_A.to_string()),
        ]
    );
}

#[test]
fn test_latest_and_earliest_ignore_input_order() {
    let entries = vec![
        at(5, ID_B, LogAction::ObjectUnlock),
        at(5, ID_C, LogAction::ObjectLock),
        at(3, ID_A, LogAction::ObjectNewVersion),
    ];
    assert_eq!(ordering::latest(&entries).unwrap().id().to_string(), ID_C);
    assert_eq!(ordering::earliest(&entries).unwrap().id().to_string(), ID_A);
    assert!(ordering::latest(&Vec::<LogEntry>::new()).is_none());
}

#[test]
fn test_tie_break_decides_lock_state() {
    // Same timestamp: the unlock has the larger id, so it wins.
    let log = common::memory_log();
    log.append(at(7, ID_A, LogAction::ObjectLock)).unwrap();
    log.append(at(7, ID_B, LogAction::ObjectUnlock)).unwrap();
    let file = ObjectRef::file(uuid(1), "a.txt");
    assert_eq!(log.lock(&file).unwrap(), None);

    // Appending order does not matter, only (timestamp, id).
    let log = common::memory_log();
    log.append(at(7, ID_C, LogAction::ObjectLock)).unwrap();
    log.append(at(7, ID_B, LogAction::ObjectUnlock)).unwrap();
    assert_eq!(log.lock(&file).unwrap().unwrap().id().to_string(), ID_C);
}

#[test]
fn test_local_entries_sort_in_creation_order() {
    let file = ObjectRef::file(uuid(1), "a.txt");
    let mut entries: Vec<LogEntry> = (0..50)
        .map(|_| LogEntry::lock(file.clone(), me()).unwrap())
        .collect();
    let created: Vec<EntryId> = entries.iter().map(|e| e.id()).collect();
    entries.reverse();
    ordering::sort(&mut entries);
    let sorted: Vec<EntryId> = entries.iter().map(|e| e.id()).collect();
    assert_eq!(created, sorted);
}
