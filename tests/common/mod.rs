#![allow(dead_code)]

use projectfold::{
    EntryId, EntryStore, LogEntry, MemoryStore, ObjectRef, ProjectLog, ProjectRef, Tag, UserId,
};
use uuid::Uuid;

pub fn uuid(n: u64) -> Uuid {
    Uuid::from_u64_pair(1, n)
}

pub fn me() -> UserId {
    UserId::new("me@example.org")
}

pub fn project() -> ProjectRef {
    ProjectRef::new(
        Uuid::parse_str("e0cd2322-6766-40a0-82c5-bcc0fe7a67c2").unwrap(),
        "test",
        "/tmp/test-project",
    )
}

pub fn memory_log() -> ProjectLog<MemoryStore> {
    ProjectLog::new(MemoryStore::new())
}

/// A log holding only the project-created entry.
pub fn created_log() -> ProjectLog<MemoryStore> {
    let log = memory_log();
    log.append(LogEntry::project_created(project(), me()).unwrap())
        .unwrap();
    log
}

/// The canonical project log: 11 entries, 2 of them unprocessed.
pub struct Fixture<S> {
    pub log: ProjectLog<S>,
    pub note1: ObjectRef,
    pub file1: ObjectRef,
    pub nofile: ObjectRef,
    pub note1_v2: EntryId,
    pub file1_lock2: EntryId,
    pub file1_delete: EntryId,
}

pub fn fill<S: EntryStore>(store: S) -> Fixture<S> {
    let log = ProjectLog::new(store);
    let append = |entry: LogEntry| log.append(entry).unwrap();

    append(LogEntry::project_created(project(), me()).unwrap());

    let note1 = ObjectRef::note(uuid(3), "foo bar");
    append(
        LogEntry::new_version(note1.clone(), me())
            .unwrap()
            .with_comment("initial checkin"),
    );
    let note1_v2 = append(
        LogEntry::new_version(note1.clone(), me())
            .unwrap()
            .with_comment("improved version")
            .with_processed(false),
    );

    let file1 = ObjectRef::file(uuid(5), "foo/bar.txt");
    append(
        LogEntry::new_version(file1.clone(), me())
            .unwrap()
            .with_comment("my version")
            .with_checksum("mychecksum"),
    );
    append(
        LogEntry::lock(file1.clone(), me())
            .unwrap()
            .with_comment("locking ..."),
    );
    append(
        LogEntry::unlock(file1.clone(), me())
            .unwrap()
            .with_comment("unlocking ..."),
    );
    let file1_lock2 = append(
        LogEntry::lock(file1.clone(), me())
            .unwrap()
            .with_comment("locking again ..."),
    );
    let file1_delete = append(
        LogEntry::delete(file1.clone(), me())
            .unwrap()
            .with_comment("I hate this file")
            .with_checksum("mychecksum")
            .with_processed(false),
    );

    let tag1 = Tag::new(file1.clone(), "tag1").unwrap();
    let tag2 = Tag::new(file1.clone(), "tag2").unwrap();
    append(LogEntry::tag_add(tag1.clone(), me()).unwrap());
    append(LogEntry::tag_add(tag2, me()).unwrap());
    append(LogEntry::tag_remove(tag1, me()).unwrap());

    let nofile = ObjectRef::file(uuid(13), "I dont exist");

    Fixture {
        log,
        note1,
        file1,
        nofile,
        note1_v2,
        file1_lock2,
        file1_delete,
    }
}

pub fn canonical() -> Fixture<MemoryStore> {
    fill(MemoryStore::new())
}
