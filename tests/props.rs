mod common;

use common::{me, memory_log, uuid};
use projectfold::reduce::{self, TagSet};
use projectfold::{ordering, EntryId, LogAction, LogEntry, ObjectRef, Subject, Tag};
use proptest::prelude::*;
use uuid::Uuid;

fn object() -> ObjectRef {
    ObjectRef::file(uuid(1), "a.txt")
}

fn arb_object_action() -> impl Strategy<Value = LogAction> {
    prop_oneof![
        Just(LogAction::ObjectNewVersion),
        Just(LogAction::ObjectDelete),
        Just(LogAction::ObjectLock),
        Just(LogAction::ObjectUnlock),
    ]
}

fn arb_entry() -> impl Strategy<Value = LogEntry> {
    (arb_object_action(), 0u64..20, any::<u128>(), any::<bool>()).prop_map(
        |(action, ts, id, processed)| {
            LogEntry::received(
                EntryId::from_uuid(Uuid::from_u128(id)),
                ts,
                action,
                Subject::Object(object()),
                me(),
            )
            .unwrap()
            .with_processed(processed)
        },
    )
}

fn arb_entries() -> impl Strategy<Value = Vec<LogEntry>> {
    proptest::collection::vec(arb_entry(), 0..40)
}

fn arb_tag_entry() -> impl Strategy<Value = LogEntry> {
    (any::<bool>(), 0usize..4).prop_map(|(add, n)| {
        let tag = Tag::new(object(), format!("tag{n}")).unwrap();
        if add {
            LogEntry::tag_add(tag, me()).unwrap()
        } else {
            LogEntry::tag_remove(tag, me()).unwrap()
        }
    })
}

fn is_sorted(entries: &[LogEntry]) -> bool {
    entries
        .windows(2)
        .all(|w| (w[0].timestamp(), w[0].id()) <= (w[1].timestamp(), w[1].id()))
}

// Sorting is total: any permutation of the same entries sorts identically.
proptest! {
    #[test]
    fn prop_sort_ignores_input_order(entries in arb_entries()) {
        let mut forward = entries.clone();
        let mut backward = entries;
        backward.reverse();
        ordering::sort(&mut forward);
        ordering::sort(&mut backward);
        prop_assert!(is_sorted(&forward));
        prop_assert_eq!(forward, backward);
    }
}

// A store returns the same ordered history whatever order entries arrive in.
proptest! {
    #[test]
    fn prop_store_order_independent_of_arrival(entries in arb_entries()) {
        let mut unique = entries;
        unique.sort_by_key(|e| e.id());
        unique.dedup_by_key(|e| e.id());

        let a = memory_log();
        let b = memory_log();
        for entry in &unique {
            a.append(entry.clone()).unwrap();
        }
        for entry in unique.iter().rev() {
            b.append(entry.clone()).unwrap();
        }

        let from_a = a.get_all(true).unwrap();
        prop_assert!(is_sorted(&from_a));
        prop_assert_eq!(&from_a, &b.get_all(true).unwrap());
        prop_assert_eq!(
            a.delete_state(&object(), true).unwrap(),
            b.delete_state(&object(), true).unwrap()
        );
        prop_assert_eq!(a.lock(&object()).unwrap(), b.lock(&object()).unwrap());
    }
}

// The delete state is decided by the latest version or delete entry alone.
proptest! {
    #[test]
    fn prop_delete_state_follows_latest_entry(entries in arb_entries()) {
        let latest = ordering::latest(
            &entries
                .iter()
                .filter(|e| matches!(
                    e.action(),
                    LogAction::ObjectNewVersion | LogAction::ObjectDelete
                ))
                .cloned()
                .collect::<Vec<_>>(),
        )
        .map(|e| e.action() == LogAction::ObjectDelete);
        prop_assert_eq!(reduce::delete_state(&entries), latest);
    }
}

// Replaying the tag history twice in a row ends in the same tag set.
proptest! {
    #[test]
    fn prop_tag_replay_idempotent(entries in proptest::collection::vec(arb_tag_entry(), 0..30)) {
        let once = reduce::fold(TagSet::default(), &entries, reduce::tag_reducer);
        let twice = reduce::fold(once.clone(), &entries, reduce::tag_reducer);
        prop_assert_eq!(once, twice);
    }
}

// Each set_processed shrinks the queue by exactly one until it is empty.
proptest! {
    #[test]
    fn prop_queue_drains_one_at_a_time(flags in proptest::collection::vec(any::<bool>(), 0..20)) {
        let log = memory_log();
        for processed in &flags {
            log.append(LogEntry::lock(object(), me()).unwrap().with_processed(*processed))
                .unwrap();
        }

        let mut pending = flags.iter().filter(|p| !**p).count();
        prop_assert_eq!(log.unprocessed().unwrap().len(), pending);
        while let Ok(next) = log.next_unprocessed() {
            log.set_processed(next.id()).unwrap();
            pending -= 1;
            prop_assert_eq!(log.unprocessed().unwrap().len(), pending);
        }
        prop_assert_eq!(pending, 0);
        prop_assert_eq!(log.get_all(false).unwrap().len(), flags.len());
    }
}
