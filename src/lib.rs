//! Append-only project log for peer-synchronized workspaces.
//!
//! Every change to a project (new versions, deletes, locks, tags, trust
//! between members) is an immutable [`LogEntry`] appended to an
//! [`EntryStore`]. Nothing else is stored: whether a file exists, who holds
//! its lock or who belongs to the project is computed on demand by folding
//! over the ordered log with [`ProjectLog`].

mod engine;
mod entry;
mod error;
mod file_store;
pub mod ordering;
mod queue;
pub mod reduce;
mod store;
mod trust;

pub use engine::ProjectLog;
pub use entry::{
    EntryId, LogAction, LogEntry, ObjectKind, ObjectRef, ProjectRef, Subject, SubjectKey, Tag,
    Timestamp, UserId,
};
pub use error::{Error, StoreError};
pub use file_store::{line_hash, FileStore, FileStoreBuilder, LockMode, DEFAULT_FILE_NAME};
pub use reduce::ReduceFn;
pub use store::{EntryStore, MemoryStore};
pub use trust::{trust_reducer, TrustLevel, TrustView};
