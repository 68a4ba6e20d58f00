use crate::entry::{EntryId, LogAction, LogEntry, SubjectKey};
use crate::error::StoreError;
use crate::store::{EntryIndex, EntryStore};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Default name of the log file inside a project's data directory.
pub const DEFAULT_FILE_NAME: &str = "log.jsonl";

/// Compute xxh64 hash of raw line bytes (without trailing newline), hex-encoded.
pub fn line_hash(line: &[u8]) -> String {
    let hash = xxhash_rust::xxh64::xxh64(line, 0);
    format!("{:016x}", hash)
}

/// How a [`FileStore`] coordinates with other handles on the same file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    /// Hold an exclusive lock for the store's lifetime. A second store on the
    /// same file fails to open.
    #[default]
    Exclusive,
    /// Lock only around each write, so several processes (e.g. the UI and a
    /// sync daemon) can share one log.
    PerWrite,
    /// No file locking. The caller guarantees a single writer.
    None,
}

/// One line of the log file.
///
/// Entries are written once and never rewritten. Processing an entry appends
/// a marker instead of editing the entry's line.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Record {
    Append { entry: LogEntry },
    Processed { id: EntryId },
}

/// Durable entry store: an append-only JSONL file plus an in-memory index.
///
/// Every operation first catches up with records appended since the last
/// call, including those written by other processes. Catching up reads only
/// the bytes past the last consumed offset, after checking that the line
/// before that offset still hashes to what was consumed. If it does not, the
/// file was replaced or truncated and the index is rebuilt from scratch.
///
/// Every write first cuts off a partial record at the end of the file, so a
/// writer that crashed mid-record cannot corrupt the next one.
///
/// # Examples
///
/// ```
/// use projectfold::{EntryStore, FileStore, LogEntry, ObjectRef};
/// use uuid::Uuid;
///
/// let dir = tempfile::tempdir().unwrap();
/// let store = FileStore::open(dir.path()).unwrap();
///
/// let note = ObjectRef::note(Uuid::new_v4(), "meeting notes");
/// let id = store.append(LogEntry::new_version(note, "me").unwrap()).unwrap();
/// assert!(store.get(id).unwrap().is_some());
/// ```
pub struct FileStore {
    path: PathBuf,
    lock_mode: LockMode,
    sync_writes: bool,
    inner: Mutex<Inner>,
}

struct Inner {
    file: File,
    view: LogView,
}

/// In-memory image of the file up to `offset`.
#[derive(Default)]
struct LogView {
    index: EntryIndex,
    offset: u64,
    hash: String,
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .field("lock_mode", &self.lock_mode)
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

/// Configures and opens a [`FileStore`].
#[derive(Debug, Clone)]
pub struct FileStoreBuilder {
    dir: PathBuf,
    file_name: String,
    lock_mode: LockMode,
    sync_writes: bool,
}

impl FileStoreBuilder {
    /// Name of the log file inside the directory. Defaults to
    /// [`DEFAULT_FILE_NAME`].
    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = name.into();
        self
    }

    /// Defaults to [`LockMode::Exclusive`].
    pub fn lock_mode(mut self, mode: LockMode) -> Self {
        self.lock_mode = mode;
        self
    }

    /// Whether to `fsync` after every record. Defaults to `true`.
    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    /// Open or create the log and load its index.
    ///
    /// Creates the directory if needed. A partial record left at the end of
    /// the file by a crash is truncated.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] with kind `AlreadyExists` if another
    /// exclusive store holds the file, or [`StoreError::Corrupt`] if a
    /// complete line cannot be decoded.
    pub fn open(self) -> Result<FileStore, StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(&self.file_name);

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        if self.lock_mode == LockMode::Exclusive {
            if let Err(e) = FileExt::try_lock_exclusive(&file) {
                if e.kind() == fs2::lock_contended_error().kind() {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("another writer holds the lock on {}", path.display()),
                    )
                    .into());
                }
                return Err(e.into());
            }
        }

        {
            let _guard = WriteGuard::acquire(&file, self.lock_mode)?;
            truncate_partial_tail(&file, &path)?;
        }

        let store = FileStore {
            path,
            lock_mode: self.lock_mode,
            sync_writes: self.sync_writes,
            inner: Mutex::new(Inner {
                file,
                view: LogView::default(),
            }),
        };
        {
            let mut inner = store.inner.lock()?;
            store.refresh(&mut inner.view)?;
            log::debug!(
                "opened {} with {} entries",
                store.path.display(),
                inner.view.index.len()
            );
        }
        Ok(store)
    }
}

impl FileStore {
    /// Start configuring a store kept in `dir`.
    pub fn builder(dir: impl AsRef<Path>) -> FileStoreBuilder {
        FileStoreBuilder {
            dir: dir.as_ref().to_path_buf(),
            file_name: DEFAULT_FILE_NAME.to_string(),
            lock_mode: LockMode::default(),
            sync_writes: true,
        }
    }

    /// Open or create a store in `dir` with default settings.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::builder(dir).open()
    }

    /// Returns the path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the current size in bytes of the log file.
    pub fn log_size(&self) -> Result<u64, StoreError> {
        Ok(fs::metadata(&self.path)?.len())
    }

    fn refresh(&self, view: &mut LogView) -> Result<(), StoreError> {
        if view.offset > 0 {
            match self.verify(view)? {
                Validity::Valid => {}
                Validity::OffsetBeyondEof => {
                    log::warn!(
                        "{}: consumed offset {} is beyond EOF, reloading",
                        self.path.display(),
                        view.offset
                    );
                    *view = LogView::default();
                }
                Validity::HashMismatch => {
                    log::warn!("{}: last consumed record changed, reloading", self.path.display());
                    *view = LogView::default();
                }
            }
        }

        let mut applied = 0usize;
        for result in read_from(&self.path, view.offset)? {
            let (record, next_offset, hash) = result?;
            match record {
                Record::Append { entry } => {
                    let id = entry.id();
                    if !view.index.insert(entry) {
                        log::warn!(
                            "{}: duplicate entry {id} at offset {}, ignoring",
                            self.path.display(),
                            view.offset
                        );
                    }
                }
                Record::Processed { id } => {
                    if view.index.mark_processed(&id).is_none() {
                        log::warn!(
                            "{}: processed marker for unknown entry {id}, ignoring",
                            self.path.display()
                        );
                    }
                }
            }
            view.offset = next_offset;
            view.hash = hash;
            applied += 1;
        }
        if applied > 0 {
            log::trace!(
                "{}: applied {applied} records, offset now {}",
                self.path.display(),
                view.offset
            );
        }
        Ok(())
    }

    fn verify(&self, view: &LogView) -> io::Result<Validity> {
        let file_size = fs::metadata(&self.path)?.len();
        if view.offset > file_size {
            return Ok(Validity::OffsetBeyondEof);
        }
        match read_line_hash_before(&self.path, view.offset)? {
            Some(hash) if hash == view.hash => Ok(Validity::Valid),
            Some(_) => Ok(Validity::HashMismatch),
            None => Ok(Validity::Valid),
        }
    }

    fn write_record(&self, file: &File, record: &Record) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        line.push('\n');
        let mut file = file;
        file.write_all(line.as_bytes())?;
        if self.sync_writes {
            file.sync_data()?;
        }
        Ok(())
    }
}

impl EntryStore for FileStore {
    fn append(&self, entry: LogEntry) -> Result<EntryId, StoreError> {
        let id = entry.id();
        let mut guard = self.inner.lock()?;
        let inner = &mut *guard;
        let _lock = WriteGuard::acquire(&inner.file, self.lock_mode)?;

        truncate_partial_tail(&inner.file, &self.path)?;
        self.refresh(&mut inner.view)?;
        if inner.view.index.contains(&id) {
            return Err(StoreError::DuplicateEntry(id));
        }
        self.write_record(&inner.file, &Record::Append { entry })?;
        self.refresh(&mut inner.view)?;
        log::debug!("{}: appended log entry {id}", self.path.display());
        Ok(id)
    }

    fn query_by_subject(
        &self,
        key: &SubjectKey,
        kinds: &[LogAction],
        include_unprocessed: bool,
    ) -> Result<Vec<LogEntry>, StoreError> {
        let mut inner = self.inner.lock()?;
        self.refresh(&mut inner.view)?;
        Ok(inner.view.index.select_subject(key, kinds, include_unprocessed))
    }

    fn query_all(&self, include_unprocessed: bool) -> Result<Vec<LogEntry>, StoreError> {
        let mut inner = self.inner.lock()?;
        self.refresh(&mut inner.view)?;
        Ok(inner.view.index.select(include_unprocessed, |_| true))
    }

    fn mark_processed(&self, id: EntryId) -> Result<(), StoreError> {
        let mut guard = self.inner.lock()?;
        let inner = &mut *guard;
        let _lock = WriteGuard::acquire(&inner.file, self.lock_mode)?;

        truncate_partial_tail(&inner.file, &self.path)?;
        self.refresh(&mut inner.view)?;
        match inner.view.index.get(&id) {
            None => return Err(StoreError::UnknownEntry(id)),
            Some(entry) if entry.is_processed() => return Ok(()),
            Some(_) => {}
        }
        self.write_record(&inner.file, &Record::Processed { id })?;
        self.refresh(&mut inner.view)?;
        log::debug!("{}: marked log entry {id} processed", self.path.display());
        Ok(())
    }

    fn get(&self, id: EntryId) -> Result<Option<LogEntry>, StoreError> {
        let mut inner = self.inner.lock()?;
        self.refresh(&mut inner.view)?;
        Ok(inner.view.index.get(&id).cloned())
    }
}

enum Validity {
    Valid,
    OffsetBeyondEof,
    HashMismatch,
}

/// Holds the file lock for the duration of one write in
/// [`LockMode::PerWrite`]; does nothing in the other modes.
struct WriteGuard<'a> {
    file: Option<&'a File>,
}

impl<'a> WriteGuard<'a> {
    fn acquire(file: &'a File, mode: LockMode) -> io::Result<Self> {
        match mode {
            LockMode::PerWrite => {
                FileExt::lock_exclusive(file)?;
                Ok(WriteGuard { file: Some(file) })
            }
            LockMode::Exclusive | LockMode::None => Ok(WriteGuard { file: None }),
        }
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if let Some(file) = self.file {
            if let Err(e) = FileExt::unlock(file) {
                log::warn!("failed to release log file lock: {e}");
            }
        }
    }
}

/// Cut off bytes after the last newline, left behind by a crash mid-write.
fn truncate_partial_tail(file: &File, path: &Path) -> io::Result<()> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }

    let mut reader = File::open(path)?;
    let mut end = len;
    let mut buf = vec![0u8; 8192];
    while end > 0 {
        let start = end.saturating_sub(buf.len() as u64);
        let chunk = &mut buf[..(end - start) as usize];
        reader.seek(SeekFrom::Start(start))?;
        reader.read_exact(chunk)?;
        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            let keep = start + pos as u64 + 1;
            if keep == len {
                return Ok(());
            }
            log::warn!(
                "{}: discarding {} bytes of partial record at end of log",
                path.display(),
                len - keep
            );
            return file.set_len(keep);
        }
        end = start;
    }

    log::warn!(
        "{}: discarding {len} bytes of partial record at end of log",
        path.display()
    );
    file.set_len(0)
}

/// Read the line immediately before the given byte offset and return its hash.
///
/// The offset should point to the byte after the newline of the last consumed line.
/// Returns `None` if offset is 0.
fn read_line_hash_before(path: &Path, offset: u64) -> io::Result<Option<String>> {
    if offset == 0 {
        return Ok(None);
    }

    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();

    if offset > file_len {
        return Ok(None);
    }

    // offset - 1 is the '\n' at end of previous line
    let newline_pos = offset - 1;
    let mut start = 0u64;

    let mut scan_end = newline_pos;
    while scan_end > 0 {
        let scan_start = scan_end.saturating_sub(8192);
        file.seek(SeekFrom::Start(scan_start))?;
        let mut buf = vec![0u8; (scan_end - scan_start) as usize];
        file.read_exact(&mut buf)?;

        if let Some(pos) = buf.iter().rposition(|&b| b == b'\n') {
            start = scan_start + pos as u64 + 1;
            break;
        }
        scan_end = scan_start;
    }

    file.seek(SeekFrom::Start(start))?;
    let mut line_buf = vec![0u8; (newline_pos - start) as usize];
    file.read_exact(&mut line_buf)?;

    Ok(Some(line_hash(&line_buf)))
}

/// Iterate the records from `offset` to the last complete line.
fn read_from(path: &Path, offset: u64) -> io::Result<RecordIterator> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;

    let file_len = file.metadata()?.len();

    Ok(RecordIterator {
        reader: BufReader::new(file),
        buf: Vec::new(),
        pos: offset,
        file_len,
    })
}

struct RecordIterator {
    reader: BufReader<File>,
    buf: Vec<u8>,
    pos: u64,
    file_len: u64,
}

impl Iterator for RecordIterator {
    type Item = Result<(Record, u64, String), StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            let read = match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(n) => n as u64,
                Err(e) => return Some(Err(e.into())),
            };

            // No trailing newline before EOF: a write still in progress, or a
            // crash mid-write. Bytes past `file_len` were appended after the
            // scan started and are left for the next one.
            if self.buf.last() != Some(&b'\n') || self.pos + read > self.file_len {
                return None;
            }

            let next_pos = self.pos + read;
            let line = &self.buf[..self.buf.len() - 1];

            if line.is_empty() {
                self.pos = next_pos;
                continue;
            }

            // Invalid UTF-8 is a decode error like any other malformed line.
            let record: Record = match serde_json::from_slice(line) {
                Ok(r) => r,
                Err(source) => {
                    return Some(Err(StoreError::Corrupt {
                        offset: self.pos,
                        source,
                    }));
                }
            };

            let hash = line_hash(line);
            self.pos = next_pos;
            return Some(Ok((record, next_pos, hash)));
        }
    }
}
