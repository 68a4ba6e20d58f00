use crate::error::Error;
use crate::trust::TrustLevel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Microseconds since the Unix epoch.
pub type Timestamp = u64;

static LAST_TIMESTAMP: AtomicU64 = AtomicU64::new(0);

/// Current time in microseconds, strictly greater than any value this
/// process handed out before.
fn next_timestamp() -> Timestamp {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_micros() as u64);
    let mut last = LAST_TIMESTAMP.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_TIMESTAMP.compare_exchange_weak(
            last,
            next,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// Unique identifier of a log entry.
///
/// Ordering follows the canonical hyphenated string form of the uuid; since
/// that form is fixed-width lowercase hex, comparing the raw bytes gives the
/// same result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Generate a fresh random id.
    pub fn new_v4() -> Self {
        EntryId(Uuid::new_v4())
    }

    /// Wrap an existing uuid, e.g. one received from a peer.
    pub fn from_uuid(uuid: Uuid) -> Self {
        EntryId(uuid)
    }

    /// The underlying uuid.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for EntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(EntryId)
    }
}

/// Identity of a peer or user acting on a project (e.g. an XMPP address).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        UserId(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        UserId(s)
    }
}

/// The two flavours of versioned object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    File,
    Note,
}

/// A versioned object (file or note).
///
/// `id` is the identity: it stays the same across every version, lock and
/// delete recorded for the object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub id: Uuid,
    pub kind: ObjectKind,
    /// Relative path for files, title for notes.
    pub name: String,
}

impl ObjectRef {
    /// A file object at `path`, relative to the project root.
    pub fn file(id: Uuid, path: impl Into<String>) -> Self {
        ObjectRef {
            id,
            kind: ObjectKind::File,
            name: path.into(),
        }
    }

    /// A note object.
    pub fn note(id: Uuid, title: impl Into<String>) -> Self {
        ObjectRef {
            id,
            kind: ObjectKind::Note,
            name: title.into(),
        }
    }

    /// Selects this object's entries, including tag entries that decorate it.
    pub fn key(&self) -> SubjectKey {
        SubjectKey::Object(self.id)
    }
}

/// A named tag attached to a versioned object.
///
/// Sorts by name first, so sets of tags on one object list alphabetically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub object: ObjectRef,
}

impl Tag {
    /// Create a tag, rejecting empty names and names containing whitespace.
    ///
    /// # Examples
    ///
    /// ```
    /// use projectfold::{ObjectRef, Tag};
    /// use uuid::Uuid;
    ///
    /// let file = ObjectRef::file(Uuid::new_v4(), "docs/readme.txt");
    /// assert!(Tag::new(file.clone(), "draft").is_ok());
    /// assert!(Tag::new(file.clone(), "").is_err());
    /// assert!(Tag::new(file, "two words").is_err());
    /// ```
    pub fn new(object: ObjectRef, name: impl Into<String>) -> Result<Self, Error> {
        let tag = Tag {
            name: name.into(),
            object,
        };
        tag.check_name()?;
        Ok(tag)
    }

    /// Selects the add/remove history of this `(object, name)` pair.
    pub fn key(&self) -> SubjectKey {
        SubjectKey::Tag {
            object: self.object.id,
            name: self.name.clone(),
        }
    }

    fn check_name(&self) -> Result<(), Error> {
        if self.name.is_empty() || self.name.chars().any(char::is_whitespace) {
            return Err(Error::InvalidEntry(format!(
                "invalid tag name {:?}",
                self.name
            )));
        }
        Ok(())
    }
}

/// A project, the root subject of its log.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectRef {
    pub id: Uuid,
    pub name: String,
    /// Where the project's files live. Not interpreted by this crate.
    pub root: PathBuf,
}

impl ProjectRef {
    pub fn new(id: Uuid, name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        ProjectRef {
            id,
            name: name.into(),
            root: root.into(),
        }
    }
}

/// What a log entry is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Object(ObjectRef),
    Tag(Tag),
    Project(ProjectRef),
    /// The trustee of a trust entry. The truster is the entry's actor.
    Member(UserId),
}

impl Subject {
    /// The narrowest key selecting this subject.
    pub fn key(&self) -> SubjectKey {
        match self {
            Subject::Object(object) => object.key(),
            Subject::Tag(tag) => tag.key(),
            Subject::Project(project) => SubjectKey::Project(project.id),
            Subject::Member(user) => SubjectKey::Member(user.clone()),
        }
    }

    /// The versioned object this subject refers to, directly or through a tag.
    pub fn object(&self) -> Option<&ObjectRef> {
        match self {
            Subject::Object(object) => Some(object),
            Subject::Tag(tag) => Some(&tag.object),
            Subject::Project(_) | Subject::Member(_) => None,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Subject::Object(_) => "object",
            Subject::Tag(_) => "tag",
            Subject::Project(_) => "project",
            Subject::Member(_) => "member",
        }
    }
}

/// Selects the entries belonging to a subject.
///
/// `Object` is deliberately wider than [`Subject::Object`]: it also matches
/// tag entries on that object, so "everything that happened to this file"
/// includes tagging.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubjectKey {
    Object(Uuid),
    Tag { object: Uuid, name: String },
    Project(Uuid),
    Member(UserId),
}

impl SubjectKey {
    /// Whether an entry about `subject` falls under this key.
    pub fn matches(&self, subject: &Subject) -> bool {
        match (self, subject) {
            (SubjectKey::Object(id), Subject::Object(object)) => object.id == *id,
            (SubjectKey::Object(id), Subject::Tag(tag)) => tag.object.id == *id,
            (SubjectKey::Tag { object, name }, Subject::Tag(tag)) => {
                tag.object.id == *object && tag.name == *name
            }
            (SubjectKey::Project(id), Subject::Project(project)) => project.id == *id,
            (SubjectKey::Member(user), Subject::Member(member)) => user == member,
            _ => false,
        }
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectKey::Object(id) => write!(f, "object {id}"),
            SubjectKey::Tag { object, name } => write!(f, "tag {name:?} on object {object}"),
            SubjectKey::Project(id) => write!(f, "project {id}"),
            SubjectKey::Member(user) => write!(f, "member {user}"),
        }
    }
}

/// The kind of change an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    ProjectCreated,
    ObjectNewVersion,
    ObjectDelete,
    ObjectLock,
    ObjectUnlock,
    TagAdd,
    TagRemove,
    StartTrustingMember,
    StopTrustingMember,
}

impl LogAction {
    /// Every action, for queries that should not filter by kind.
    pub const ALL: [LogAction; 9] = [
        LogAction::ProjectCreated,
        LogAction::ObjectNewVersion,
        LogAction::ObjectDelete,
        LogAction::ObjectLock,
        LogAction::ObjectUnlock,
        LogAction::TagAdd,
        LogAction::TagRemove,
        LogAction::StartTrustingMember,
        LogAction::StopTrustingMember,
    ];

    /// Whether entries of this kind may be about `subject`.
    pub fn accepts(self, subject: &Subject) -> bool {
        match self {
            LogAction::ProjectCreated => matches!(subject, Subject::Project(_)),
            LogAction::ObjectNewVersion
            | LogAction::ObjectDelete
            | LogAction::ObjectLock
            | LogAction::ObjectUnlock => matches!(subject, Subject::Object(_)),
            LogAction::TagAdd | LogAction::TagRemove => matches!(subject, Subject::Tag(_)),
            LogAction::StartTrustingMember | LogAction::StopTrustingMember => {
                matches!(subject, Subject::Member(_))
            }
        }
    }

    fn default_trust(self) -> Option<TrustLevel> {
        match self {
            LogAction::StartTrustingMember => Some(TrustLevel::Trust),
            LogAction::StopTrustingMember => Some(TrustLevel::NoTrust),
            LogAction::ProjectCreated
            | LogAction::ObjectNewVersion
            | LogAction::ObjectDelete
            | LogAction::ObjectLock
            | LogAction::ObjectUnlock
            | LogAction::TagAdd
            | LogAction::TagRemove => None,
        }
    }
}

/// One immutable record in a project's history.
///
/// Entries are serialized as JSON by the stores. Everything except
/// `processed` is fixed at construction; `processed` only ever moves from
/// `false` to `true`, and only through
/// [`EntryStore::mark_processed`](crate::EntryStore::mark_processed).
///
/// # Examples
///
/// ```
/// use projectfold::{LogAction, LogEntry, ObjectRef};
/// use uuid::Uuid;
///
/// let file = ObjectRef::file(Uuid::new_v4(), "src/main.c");
/// let entry = LogEntry::new_version(file, "alice@example.org")
///     .unwrap()
///     .with_comment("first draft")
///     .with_checksum("9f86d081");
/// assert_eq!(entry.action(), LogAction::ObjectNewVersion);
/// assert_eq!(entry.comment(), Some("first draft"));
/// assert!(entry.is_processed());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    id: EntryId,
    action: LogAction,
    #[serde(rename = "ts")]
    timestamp: Timestamp,
    subject: Subject,
    actor: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trust: Option<TrustLevel>,
    processed: bool,
}

impl LogEntry {
    /// Create an entry for a local action.
    ///
    /// Assigns a fresh id and the current timestamp. Local actions already
    /// reflect the new state, so the entry starts out processed; use
    /// [`with_processed`](Self::with_processed) to change that.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidEntry`] if the actor is empty or `action` cannot
    /// apply to `subject`.
    pub fn new(action: LogAction, subject: Subject, actor: impl Into<UserId>) -> Result<Self, Error> {
        let entry = LogEntry {
            id: EntryId::new_v4(),
            action,
            timestamp: next_timestamp(),
            subject,
            actor: actor.into(),
            comment: None,
            checksum: None,
            trust: action.default_trust(),
            processed: true,
        };
        entry.validate()?;
        Ok(entry)
    }

    /// Rebuild an entry delivered by a remote peer.
    ///
    /// Keeps the peer's id and timestamp and starts unprocessed, so it stays
    /// out of settled views until the consumer integrates it.
    pub fn received(
        id: EntryId,
        timestamp: Timestamp,
        action: LogAction,
        subject: Subject,
        actor: impl Into<UserId>,
    ) -> Result<Self, Error> {
        let entry = LogEntry {
            id,
            action,
            timestamp,
            subject,
            actor: actor.into(),
            comment: None,
            checksum: None,
            trust: action.default_trust(),
            processed: false,
        };
        entry.validate()?;
        Ok(entry)
    }

    /// The root entry of a project's log.
    pub fn project_created(project: ProjectRef, actor: impl Into<UserId>) -> Result<Self, Error> {
        Self::new(LogAction::ProjectCreated, Subject::Project(project), actor)
    }

    pub fn new_version(object: ObjectRef, actor: impl Into<UserId>) -> Result<Self, Error> {
        Self::new(LogAction::ObjectNewVersion, Subject::Object(object), actor)
    }

    pub fn delete(object: ObjectRef, actor: impl Into<UserId>) -> Result<Self, Error> {
        Self::new(LogAction::ObjectDelete, Subject::Object(object), actor)
    }

    pub fn lock(object: ObjectRef, actor: impl Into<UserId>) -> Result<Self, Error> {
        Self::new(LogAction::ObjectLock, Subject::Object(object), actor)
    }

    pub fn unlock(object: ObjectRef, actor: impl Into<UserId>) -> Result<Self, Error> {
        Self::new(LogAction::ObjectUnlock, Subject::Object(object), actor)
    }

    pub fn tag_add(tag: Tag, actor: impl Into<UserId>) -> Result<Self, Error> {
        Self::new(LogAction::TagAdd, Subject::Tag(tag), actor)
    }

    pub fn tag_remove(tag: Tag, actor: impl Into<UserId>) -> Result<Self, Error> {
        Self::new(LogAction::TagRemove, Subject::Tag(tag), actor)
    }

    /// `truster` starts trusting `trustee` at `level`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidEntry`] for [`TrustLevel::NoTrust`]; withdrawing trust
    /// is [`stop_trusting`](Self::stop_trusting).
    pub fn start_trusting(
        truster: impl Into<UserId>,
        trustee: impl Into<UserId>,
        level: TrustLevel,
    ) -> Result<Self, Error> {
        let entry = Self::new(
            LogAction::StartTrustingMember,
            Subject::Member(trustee.into()),
            truster,
        )?
        .with_trust_level(level);
        entry.validate()?;
        Ok(entry)
    }

    pub fn stop_trusting(truster: impl Into<UserId>, trustee: impl Into<UserId>) -> Result<Self, Error> {
        Self::new(
            LogAction::StopTrustingMember,
            Subject::Member(trustee.into()),
            truster,
        )
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Content checksum; meaningful for version and delete entries.
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// Override the trust level carried by a start-trusting entry.
    ///
    /// Checked by [`validate`](Self::validate) before the entry is stored.
    pub fn with_trust_level(mut self, level: TrustLevel) -> Self {
        self.trust = Some(level);
        self
    }

    pub fn with_processed(mut self, processed: bool) -> Self {
        self.processed = processed;
        self
    }

    /// Check the invariants that construction enforces.
    ///
    /// Entries decoded from a store or the network bypass the constructors;
    /// [`ProjectLog::append`](crate::ProjectLog::append) calls this before
    /// anything is persisted.
    pub fn validate(&self) -> Result<(), Error> {
        if self.actor.as_str().trim().is_empty() {
            return Err(Error::InvalidEntry(format!("entry {} has no actor", self.id)));
        }
        if !self.action.accepts(&self.subject) {
            return Err(Error::InvalidEntry(format!(
                "{:?} cannot apply to a {} subject",
                self.action,
                self.subject.kind_name()
            )));
        }
        if let Subject::Tag(tag) = &self.subject {
            tag.check_name()?;
        }
        let trust_ok = match self.action {
            LogAction::StartTrustingMember => {
                matches!(self.trust, Some(TrustLevel::Trust | TrustLevel::AutoAddRemove))
            }
            LogAction::StopTrustingMember => self.trust == Some(TrustLevel::NoTrust),
            LogAction::ProjectCreated
            | LogAction::ObjectNewVersion
            | LogAction::ObjectDelete
            | LogAction::ObjectLock
            | LogAction::ObjectUnlock
            | LogAction::TagAdd
            | LogAction::TagRemove => self.trust.is_none(),
        };
        if !trust_ok {
            return Err(Error::InvalidEntry(format!(
                "{:?} cannot carry trust level {:?}",
                self.action, self.trust
            )));
        }
        Ok(())
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn action(&self) -> LogAction {
        self.action
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// The acting user. For trust entries, the truster.
    pub fn actor(&self) -> &UserId {
        &self.actor
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    /// The trust level set by a trust entry; `None` for every other kind.
    pub fn trust_level(&self) -> Option<TrustLevel> {
        self.trust
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    pub(crate) fn mark_processed(&mut self) -> bool {
        let changed = !self.processed;
        self.processed = true;
        changed
    }
}
