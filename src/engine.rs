//! Derived views over a project's log.

use crate::entry::{EntryId, LogAction, LogEntry, ObjectKind, ObjectRef, SubjectKey, Tag, UserId};
use crate::error::Error;
use crate::ordering;
use crate::reduce::{self, ObjectStates, TagSet};
use crate::store::EntryStore;
use crate::trust::{self, TrustLevel, TrustView};
use std::collections::{BTreeMap, BTreeSet};

const EXISTENCE_KINDS: [LogAction; 2] = [LogAction::ObjectNewVersion, LogAction::ObjectDelete];
const LOCK_KINDS: [LogAction; 2] = [LogAction::ObjectLock, LogAction::ObjectUnlock];
const TAG_KINDS: [LogAction; 2] = [LogAction::TagAdd, LogAction::TagRemove];
const TRUST_KINDS: [LogAction; 3] = [
    LogAction::ProjectCreated,
    LogAction::StartTrustingMember,
    LogAction::StopTrustingMember,
];

/// Query façade over one project's entry store.
///
/// Holds nothing but the store handle: every view is recomputed from the
/// entries the store returns at call time. Methods taking
/// `include_unprocessed` distinguish the settled view (`false`) from the
/// tentative one that also counts entries received but not yet integrated.
/// Lock, tag and trust views always count every entry.
///
/// # Examples
///
/// ```
/// use projectfold::{LogEntry, MemoryStore, ObjectRef, ProjectLog, ProjectRef};
/// use uuid::Uuid;
///
/// let log = ProjectLog::new(MemoryStore::new());
/// let project = ProjectRef::new(Uuid::new_v4(), "thesis", "/home/me/thesis");
/// log.append(LogEntry::project_created(project, "me").unwrap()).unwrap();
///
/// let file = ObjectRef::file(Uuid::new_v4(), "chapter1.tex");
/// log.append(LogEntry::new_version(file.clone(), "me").unwrap()).unwrap();
/// log.append(LogEntry::lock(file.clone(), "me").unwrap()).unwrap();
///
/// assert_eq!(log.delete_state(&file, false).unwrap(), Some(false));
/// assert!(log.lock(&file).unwrap().is_some());
/// assert_eq!(log.current_members().unwrap().len(), 1);
/// ```
#[derive(Debug)]
pub struct ProjectLog<S> {
    store: S,
}

impl<S: EntryStore> ProjectLog<S> {
    pub fn new(store: S) -> Self {
        ProjectLog { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Validate and persist an entry.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidEntry`] if the entry fails
    /// [`LogEntry::validate`], or if it is a project-created entry and the
    /// log already holds a different one. Nothing is stored in that case.
    /// Order is not checked: a peer's root entry may arrive after others.
    pub fn append(&self, entry: LogEntry) -> Result<EntryId, Error> {
        entry.validate()?;
        if entry.action() == LogAction::ProjectCreated {
            if let Some(existing) = self.project_created_entry()? {
                // The same entry delivered twice is left to the store's
                // duplicate check.
                if existing.id() != entry.id() {
                    return Err(Error::InvalidEntry(format!(
                        "project already created by entry {}",
                        existing.id()
                    )));
                }
            }
        }
        Ok(self.store.append(entry)?)
    }

    pub(crate) fn fetch(
        &self,
        key: &SubjectKey,
        kinds: &[LogAction],
        include_unprocessed: bool,
    ) -> Result<Vec<LogEntry>, Error> {
        let mut entries = self.store.query_by_subject(key, kinds, include_unprocessed)?;
        ordering::sort(&mut entries);
        Ok(entries)
    }

    pub(crate) fn fetch_all(&self, include_unprocessed: bool) -> Result<Vec<LogEntry>, Error> {
        let mut entries = self.store.query_all(include_unprocessed)?;
        ordering::sort(&mut entries);
        Ok(entries)
    }

    /// Every entry of the project, oldest first.
    pub fn get_all(&self, include_unprocessed: bool) -> Result<Vec<LogEntry>, Error> {
        self.fetch_all(include_unprocessed)
    }

    /// Every entry about `object`, its tag entries included.
    pub fn all_of_object(
        &self,
        object: &ObjectRef,
        include_unprocessed: bool,
    ) -> Result<Vec<LogEntry>, Error> {
        self.fetch(&object.key(), &LogAction::ALL, include_unprocessed)
    }

    /// The most recent entry of any kind about `object`, tag entries
    /// included.
    ///
    /// # Errors
    ///
    /// [`Error::NoSuchEntry`] if the object has no history.
    pub fn last_of_object(
        &self,
        object: &ObjectRef,
        include_unprocessed: bool,
    ) -> Result<LogEntry, Error> {
        self.all_of_object(object, include_unprocessed)?
            .pop()
            .ok_or_else(|| Error::NoSuchEntry(object.key()))
    }

    /// All new-version entries in the project, oldest first. Deletes are not
    /// listed.
    pub fn all_versions(&self, include_unprocessed: bool) -> Result<Vec<LogEntry>, Error> {
        let entries = self.fetch_all(include_unprocessed)?;
        Ok(reduce::versions(&entries).cloned().collect())
    }

    /// New-version entries of `object`, oldest first.
    pub fn all_versions_of_object(
        &self,
        object: &ObjectRef,
        include_unprocessed: bool,
    ) -> Result<Vec<LogEntry>, Error> {
        let entries = self.fetch(&object.key(), &[LogAction::ObjectNewVersion], include_unprocessed)?;
        Ok(reduce::versions(&entries).cloned().collect())
    }

    /// The current version of `object`: its latest new-version entry, or
    /// `None` if there is none or a delete came after it.
    pub fn last_version(
        &self,
        object: &ObjectRef,
        include_unprocessed: bool,
    ) -> Result<Option<LogEntry>, Error> {
        let entries = self.fetch(&object.key(), &EXISTENCE_KINDS, include_unprocessed)?;
        Ok(reduce::last_version(&entries).cloned())
    }

    /// The latest new-version entry of `object`, even if it was deleted
    /// since.
    ///
    /// # Errors
    ///
    /// [`Error::NoSuchEntry`] if the object never had a version.
    pub fn last_version_of_object(
        &self,
        object: &ObjectRef,
        include_unprocessed: bool,
    ) -> Result<LogEntry, Error> {
        let entries = self.fetch(&object.key(), &[LogAction::ObjectNewVersion], include_unprocessed)?;
        reduce::newest_version(&entries)
            .cloned()
            .ok_or_else(|| Error::NoSuchEntry(object.key()))
    }

    /// `Some(true)` if deleted, `Some(false)` if it exists, `None` if the
    /// object has neither versions nor deletes.
    pub fn delete_state(
        &self,
        object: &ObjectRef,
        include_unprocessed: bool,
    ) -> Result<Option<bool>, Error> {
        let entries = self.fetch(&object.key(), &EXISTENCE_KINDS, include_unprocessed)?;
        Ok(reduce::delete_state(&entries))
    }

    /// Objects whose delete state is `Some(false)`, ordered by id.
    pub fn existing_objects(&self, include_unprocessed: bool) -> Result<Vec<ObjectRef>, Error> {
        Ok(self.object_states(include_unprocessed)?.existing().cloned().collect())
    }

    /// Like [`existing_objects`](Self::existing_objects), files only.
    pub fn existing_files(&self, include_unprocessed: bool) -> Result<Vec<ObjectRef>, Error> {
        Ok(self
            .object_states(include_unprocessed)?
            .existing()
            .filter(|object| object.kind == ObjectKind::File)
            .cloned()
            .collect())
    }

    fn object_states(&self, include_unprocessed: bool) -> Result<ObjectStates, Error> {
        let entries = self.fetch_all(include_unprocessed)?;
        Ok(reduce::fold(
            ObjectStates::default(),
            &entries,
            reduce::existence_reducer,
        ))
    }

    /// The lock entry holding `object`, or `None` if it is unlocked or was
    /// never locked. A deleted object can still be locked.
    pub fn lock(&self, object: &ObjectRef) -> Result<Option<LogEntry>, Error> {
        let entries = self.fetch(&object.key(), &LOCK_KINDS, true)?;
        Ok(reduce::lock(&entries).cloned())
    }

    /// Tags currently on `object`. Empty if it never had any.
    pub fn tags(&self, object: &ObjectRef) -> Result<BTreeSet<Tag>, Error> {
        let entries = self.fetch(&object.key(), &TAG_KINDS, true)?;
        Ok(reduce::fold(TagSet::default(), &entries, reduce::tag_reducer).into_tags())
    }

    /// The root entry of the log, if the project-created entry is stored.
    pub fn project_created_entry(&self) -> Result<Option<LogEntry>, Error> {
        let entries = self.fetch_all(true)?;
        Ok(ordering::earliest(
            entries
                .iter()
                .filter(|e| e.action() == LogAction::ProjectCreated),
        )
        .cloned())
    }

    /// The actor of the project-created entry.
    pub fn project_creator(&self) -> Result<Option<UserId>, Error> {
        Ok(self.project_created_entry()?.map(|e| e.actor().clone()))
    }

    fn trust_view(&self) -> Result<TrustView, Error> {
        let entries: Vec<LogEntry> = self
            .fetch_all(true)?
            .into_iter()
            .filter(|e| TRUST_KINDS.contains(&e.action()))
            .collect();
        Ok(reduce::fold(TrustView::default(), &entries, trust::trust_reducer))
    }

    /// truster → members they currently trust.
    ///
    /// The creator appears trusting itself unless it withdrew that trust.
    pub fn trust_graph(&self) -> Result<BTreeMap<UserId, BTreeSet<UserId>>, Error> {
        Ok(self.trust_view()?.graph())
    }

    /// truster → (trustee → last trust level), withdrawn trust included.
    pub fn extended_trust_graph(
        &self,
    ) -> Result<BTreeMap<UserId, BTreeMap<UserId, TrustLevel>>, Error> {
        Ok(self.trust_view()?.extended().clone())
    }

    /// Members trusted by anyone, plus the project creator.
    pub fn current_members(&self) -> Result<BTreeSet<UserId>, Error> {
        Ok(self.trust_view()?.members())
    }

    /// Does `a` currently trust `b`? `false` without history.
    pub fn trusts(&self, a: &UserId, b: &UserId) -> Result<bool, Error> {
        Ok(self.trust_view()?.trusts(a, b))
    }

    /// The last trust level `a` set for `b`; `None` without history.
    pub fn trusts_how(&self, a: &UserId, b: &UserId) -> Result<Option<TrustLevel>, Error> {
        Ok(self.trust_view()?.level(a, b))
    }

    /// Members `a` currently trusts.
    pub fn trusted_by(&self, a: &UserId) -> Result<BTreeSet<UserId>, Error> {
        Ok(self.trust_view()?.trusted_by(a))
    }

    /// Last trust level `a` set for each member.
    pub fn trusts_how_all(&self, a: &UserId) -> Result<BTreeMap<UserId, TrustLevel>, Error> {
        Ok(self.trust_view()?.levels_of(a))
    }
}
