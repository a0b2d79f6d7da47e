//! store::handle
//!
//! The shared, per-path document state behind every [`DocFile`] reference.
//!
//! # Invariants
//!
//! - Exactly one `Handle` exists per registered path
//! - Only the owner thread reads, writes, or commits the content
//! - `last_committed` always equals the canonical file's bytes when it is
//!   `Some`; `None` forces the next commit to write
//! - Once `released` is set it never clears
//!
//! [`DocFile`]: crate::store::DocFile

use std::any::Any;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread::{self, ThreadId};

use crate::core::format::Codec;
use crate::core::ops::{AtomicWriter, CommitMode};

use super::errors::StoreError;

/// Result of a commit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// New bytes were written to disk.
    Written,
    /// The serialized content matched the last commit; no file was touched.
    Unchanged,
}

impl CommitOutcome {
    pub fn was_written(&self) -> bool {
        matches!(self, CommitOutcome::Written)
    }
}

pub(crate) struct HandleState<T> {
    content: T,
    codec: Arc<dyn Codec<T>>,
    last_committed: Option<Vec<u8>>,
    /// A canonical file exists, so commits must go through the marker.
    canonical_exists: bool,
    /// The last commit failed part-way; recover before the next one.
    interrupted: bool,
}

impl<T> HandleState<T> {
    fn commit(&mut self, writer: &AtomicWriter) -> Result<CommitOutcome, StoreError> {
        let bytes = self.codec.encode(&self.content)?;

        if self.interrupted {
            // disk is back at `last_committed` once the marker is restored
            writer.recover()?;
            self.canonical_exists = writer.status()?.canonical;
            self.interrupted = false;
        }

        if self.last_committed.as_deref() == Some(bytes.as_slice()) {
            tracing::debug!(
                path = %writer.paths().canonical.display(),
                "content unchanged, skipping commit"
            );
            return Ok(CommitOutcome::Unchanged);
        }

        let mode = if self.canonical_exists {
            CommitMode::Replace
        } else {
            CommitMode::FirstWrite
        };
        if let Err(err) = writer.commit(&bytes, mode) {
            self.interrupted = true;
            return Err(err.into());
        }

        self.canonical_exists = true;
        self.last_committed = Some(bytes);
        Ok(CommitOutcome::Written)
    }
}

/// Shared state for one open document.
pub(crate) struct Handle<T> {
    writer: AtomicWriter,
    owner: ThreadId,
    released: AtomicBool,
    state: Mutex<HandleState<T>>,
}

impl<T: Send + 'static> Handle<T> {
    /// Recover, load or create, and return the handle.
    ///
    /// The calling thread becomes the owner. When no canonical file exists
    /// the default value is committed synchronously.
    pub(crate) fn create<F>(
        writer: AtomicWriter,
        codec: Arc<dyn Codec<T>>,
        default: F,
    ) -> Result<Self, StoreError>
    where
        F: FnOnce() -> T,
    {
        writer.recover()?;

        let mut state = match writer.read_canonical()? {
            Some(bytes) => HandleState {
                content: codec.decode(&bytes)?,
                codec,
                last_committed: Some(bytes),
                canonical_exists: true,
                interrupted: false,
            },
            None => HandleState {
                content: default(),
                codec,
                last_committed: None,
                canonical_exists: false,
                interrupted: false,
            },
        };

        if !state.canonical_exists {
            tracing::debug!(
                path = %writer.paths().canonical.display(),
                "no file on disk, writing default document"
            );
            state.commit(&writer)?;
        }

        Ok(Self {
            writer,
            owner: thread::current().id(),
            released: AtomicBool::new(false),
            state: Mutex::new(state),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.writer.paths().canonical
    }

    pub(crate) fn owner(&self) -> ThreadId {
        self.owner
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub(crate) fn mark_released(&self) {
        self.released.store(true, Ordering::Release);
    }

    /// Fail unless the handle is live and the caller owns it.
    pub(crate) fn check_access(&self) -> Result<(), StoreError> {
        if self.is_released() {
            return Err(StoreError::AccessAfterRelease(self.path().to_path_buf()));
        }
        self.check_thread()
    }

    pub(crate) fn check_thread(&self) -> Result<(), StoreError> {
        let caller = thread::current().id();
        if caller != self.owner {
            return Err(StoreError::ThreadAffinity {
                path: self.path().to_path_buf(),
                owner: self.owner,
                caller,
            });
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HandleState<T>>, StoreError> {
        match self.state.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => {
                Err(StoreError::ContentBusy(self.path().to_path_buf()))
            }
            // a panic mid-mutation leaves content as the panicking code left it
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
        }
    }

    /// Borrow the content for reading and writing.
    pub(crate) fn content(&self) -> Result<ContentGuard<'_, T>, StoreError> {
        self.check_access()?;
        Ok(ContentGuard { guard: self.lock()? })
    }

    /// Replace the content wholesale.
    pub(crate) fn replace_content(&self, value: T) -> Result<T, StoreError> {
        let mut guard = self.content()?;
        Ok(std::mem::replace(&mut *guard, value))
    }

    pub(crate) fn commit(&self) -> Result<CommitOutcome, StoreError> {
        self.check_access()?;
        self.commit_unchecked()
    }

    /// Commit without the liveness check; the registry uses this for the
    /// final commit after it has validated the caller itself.
    pub(crate) fn commit_unchecked(&self) -> Result<CommitOutcome, StoreError> {
        self.lock()?.commit(&self.writer)
    }

    /// Swap the codec and rewrite the document under it.
    pub(crate) fn migrate(&self, codec: Arc<dyn Codec<T>>) -> Result<CommitOutcome, StoreError> {
        self.check_access()?;
        let mut state = self.lock()?;

        tracing::debug!(
            path = %self.path().display(),
            from = state.codec.name(),
            to = codec.name(),
            "migrating document format"
        );
        let previous_codec = std::mem::replace(&mut state.codec, codec);
        let previous_bytes = state.last_committed.take();
        match state.commit(&self.writer) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                state.codec = previous_codec;
                state.last_committed = previous_bytes;
                Err(err)
            }
        }
    }
}

/// Exclusive borrow of a document's content.
///
/// While a guard is alive, other references to the same document get
/// [`StoreError::ContentBusy`] instead of blocking.
pub struct ContentGuard<'a, T> {
    guard: MutexGuard<'a, HandleState<T>>,
}

impl<T> Deref for ContentGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard.content
    }
}

impl<T> DerefMut for ContentGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard.content
    }
}

/// Type-erased view of a handle, for registry bookkeeping that does not
/// know the document type.
pub(crate) trait ErasedHandle: Send + Sync {
    fn owner(&self) -> ThreadId;
    fn path(&self) -> &Path;
    fn final_commit(&self) -> Result<CommitOutcome, StoreError>;
    fn mark_released(&self);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Send + 'static> ErasedHandle for Handle<T> {
    fn owner(&self) -> ThreadId {
        Handle::owner(self)
    }

    fn path(&self) -> &Path {
        Handle::path(self)
    }

    fn final_commit(&self) -> Result<CommitOutcome, StoreError> {
        self.commit_unchecked()
    }

    fn mark_released(&self) {
        Handle::mark_released(self)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::format::{Format, SerdeCodec};
    use crate::core::paths::DocumentPaths;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    type Counters = BTreeMap<String, u64>;

    fn codec(format: Format) -> Arc<dyn Codec<Counters>> {
        Arc::new(SerdeCodec::new(format).expect("codec"))
    }

    fn writer_in(temp: &TempDir, name: &str) -> AtomicWriter {
        AtomicWriter::new(DocumentPaths::for_canonical(temp.path().join(name)))
    }

    #[test]
    fn create_writes_default_when_missing() {
        let temp = TempDir::new().expect("create temp dir");
        let writer = writer_in(&temp, "c.json");
        let canonical = writer.paths().canonical.clone();

        let handle = Handle::create(writer, codec(Format::CompactJson), Counters::new).expect("create");

        assert_eq!(fs::read(&canonical).expect("read"), b"{}");
        assert!(handle.content().expect("content").is_empty());
    }

    #[test]
    fn create_loads_existing_file() {
        let temp = TempDir::new().expect("create temp dir");
        let writer = writer_in(&temp, "c.json");
        fs::write(&writer.paths().canonical, br#"{"n":4}"#).expect("seed");

        let handle = Handle::create(writer, codec(Format::CompactJson), Counters::new).expect("create");
        assert_eq!(handle.content().expect("content").get("n"), Some(&4));
    }

    #[test]
    fn create_runs_recovery_first() {
        let temp = TempDir::new().expect("create temp dir");
        let writer = writer_in(&temp, "c.json");
        fs::write(&writer.paths().marker, br#"{"n":1}"#).expect("stage marker");
        let marker = writer.paths().marker.clone();

        let handle = Handle::create(writer, codec(Format::CompactJson), Counters::new).expect("create");

        assert!(!marker.exists());
        assert_eq!(handle.content().expect("content").get("n"), Some(&1));
    }

    #[test]
    fn undecodable_file_is_codec_error() {
        let temp = TempDir::new().expect("create temp dir");
        let writer = writer_in(&temp, "c.json");
        fs::write(&writer.paths().canonical, b"not json").expect("seed");

        let result = Handle::create(writer, codec(Format::PrettyJson), Counters::new);
        assert!(matches!(result, Err(StoreError::Codec(_))));
    }

    #[test]
    fn unchanged_commit_is_skipped() {
        let temp = TempDir::new().expect("create temp dir");
        let handle =
            Handle::create(writer_in(&temp, "c.json"), codec(Format::PrettyJson), Counters::new)
                .expect("create");

        assert_eq!(handle.commit().expect("commit"), CommitOutcome::Unchanged);

        handle.content().expect("content").insert("a".into(), 1);
        assert_eq!(handle.commit().expect("commit"), CommitOutcome::Written);
        assert_eq!(handle.commit().expect("commit"), CommitOutcome::Unchanged);
    }

    #[test]
    fn second_borrow_is_busy() {
        let temp = TempDir::new().expect("create temp dir");
        let handle =
            Handle::create(writer_in(&temp, "c.json"), codec(Format::PrettyJson), Counters::new)
                .expect("create");

        let _guard = handle.content().expect("first borrow");
        assert!(matches!(handle.content(), Err(StoreError::ContentBusy(_))));
        assert!(matches!(handle.commit(), Err(StoreError::ContentBusy(_))));
    }

    #[test]
    fn released_handle_rejects_access() {
        let temp = TempDir::new().expect("create temp dir");
        let handle =
            Handle::create(writer_in(&temp, "c.json"), codec(Format::PrettyJson), Counters::new)
                .expect("create");

        handle.mark_released();
        assert!(matches!(
            handle.content(),
            Err(StoreError::AccessAfterRelease(_))
        ));
        assert!(matches!(
            handle.commit(),
            Err(StoreError::AccessAfterRelease(_))
        ));
    }

    #[test]
    fn other_thread_rejected() {
        let temp = TempDir::new().expect("create temp dir");
        let handle = Arc::new(
            Handle::create(writer_in(&temp, "c.json"), codec(Format::PrettyJson), Counters::new)
                .expect("create"),
        );

        let remote = Arc::clone(&handle);
        let result = thread::spawn(move || remote.commit().map(|_| ()))
            .join()
            .expect("join");
        assert!(matches!(result, Err(StoreError::ThreadAffinity { .. })));
    }

    #[test]
    fn migrate_rewrites_identical_bytes() {
        let temp = TempDir::new().expect("create temp dir");
        let handle =
            Handle::create(writer_in(&temp, "c.json"), codec(Format::CompactJson), Counters::new)
                .expect("create");

        // `{}` encodes identically in both JSON flavors
        let outcome = handle.migrate(codec(Format::PrettyJson)).expect("migrate");
        assert_eq!(outcome, CommitOutcome::Written);
        assert!(!handle.writer.paths().marker.exists());
    }

    #[test]
    fn retry_after_interrupted_commit() {
        use crate::core::ops::fault_injection::{self, CrashPoint};

        let temp = TempDir::new().expect("create temp dir");
        let writer = writer_in(&temp, "c.json");
        let canonical = writer.paths().canonical.clone();
        let handle =
            Handle::create(writer, codec(Format::CompactJson), Counters::new).expect("create");
        handle.content().expect("content").insert("a".into(), 1);

        fault_injection::set_crash_at(CrashPoint::AfterMarkerRename);
        assert!(matches!(handle.commit(), Err(StoreError::Write(_))));
        assert!(!canonical.exists());

        assert_eq!(handle.commit().expect("retry"), CommitOutcome::Written);
        assert_eq!(fs::read(&canonical).expect("read"), br#"{"a":1}"#);
        assert!(!handle.writer.paths().marker.exists());
        fault_injection::reset();
    }

    #[test]
    fn failed_migration_keeps_old_codec() {
        let temp = TempDir::new().expect("create temp dir");
        let writer = writer_in(&temp, "list.json");
        let canonical = writer.paths().canonical.clone();
        let json: Arc<dyn Codec<Vec<u64>>> =
            Arc::new(SerdeCodec::new(Format::CompactJson).expect("codec"));
        let toml: Arc<dyn Codec<Vec<u64>>> =
            Arc::new(SerdeCodec::new(Format::Toml).expect("codec"));
        let handle = Handle::create(writer, json, || vec![1, 2]).expect("create");

        // a bare array has no TOML representation
        assert!(matches!(handle.migrate(toml), Err(StoreError::Codec(_))));

        assert_eq!(handle.commit().expect("commit"), CommitOutcome::Unchanged);
        assert_eq!(fs::read(&canonical).expect("read"), b"[1,2]");
    }
}
