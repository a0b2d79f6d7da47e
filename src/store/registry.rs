//! store::registry
//!
//! Process-local table from normalized path to the single live handle for
//! that path.
//!
//! # Architecture
//!
//! `DocumentStore` is an explicitly constructed service. Clones share one
//! table; every [`DocFile`] keeps the store alive so it can release itself.
//! [`DocumentStore::shutdown`] ends the lifecycle explicitly.
//!
//! # Invariants
//!
//! - A path appears at most once
//! - An entry is removed exactly when its refcount reaches zero, or on
//!   discard/shutdown
//! - Every removed handle is marked released before the lock is dropped
//! - Handle creation (recovery, load, first write) runs under the table
//!   lock, so racing opens of a new path converge on one handle
//!
//! # Example
//!
//! ```no_run
//! use docfile::store::DocumentStore;
//! use std::collections::BTreeMap;
//!
//! let store = DocumentStore::in_dir("/var/lib/myapp")?;
//! let mut doc = store.open::<BTreeMap<String, u64>>("counters.json")?;
//!
//! doc.update(|c| *c.entry("hits".into()).or_default() += 1)?;
//! doc.commit()?;
//! doc.release()?;
//! # Ok::<(), docfile::store::StoreError>(())
//! ```

use std::any::{self, TypeId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::config::Config;
use crate::core::format::{Codec, Format, SerdeCodec};
use crate::core::ops::{ArtifactStatus, AtomicWriter, CommitMode, RecoveryOutcome};
use crate::core::paths::{friendly_type_name, DocumentPaths, NormalizedPath};

use super::document::DocFile;
use super::errors::StoreError;
use super::handle::{ErasedHandle, Handle};

/// Settings resolved from [`Config`] at construction.
#[derive(Debug, Clone)]
struct Settings {
    base_dir: PathBuf,
    default_format: Format,
    max_uncommitted_changes: u64,
    sync_writes: bool,
}

struct Entry {
    handle: Arc<dyn ErasedHandle>,
    type_id: TypeId,
    type_name: &'static str,
    refcount: usize,
}

#[derive(Default)]
struct Table {
    entries: HashMap<NormalizedPath, Entry>,
    closed: bool,
}

struct StoreInner {
    settings: Settings,
    table: Mutex<Table>,
}

/// What [`DocumentStore::shutdown`] did with the documents still open.
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Documents owned by the calling thread that got a final commit.
    pub committed: Vec<PathBuf>,
    /// Documents owned by other threads, evicted without writing.
    pub abandoned: Vec<PathBuf>,
    /// Documents whose final commit failed; evicted without writing.
    pub failed: Vec<(PathBuf, StoreError)>,
}

impl ShutdownReport {
    /// True when every open document was committed.
    pub fn is_clean(&self) -> bool {
        self.abandoned.is_empty() && self.failed.is_empty()
    }
}

/// Registry of open documents.
#[derive(Clone)]
pub struct DocumentStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("base_dir", &self.inner.settings.base_dir)
            .field("open", &self.lock().entries.len())
            .finish()
    }
}

impl DocumentStore {
    /// Build a store from configuration.
    ///
    /// An explicitly configured base directory is created if missing;
    /// otherwise relative paths resolve against the current directory. The
    /// base directory is stored canonicalized.
    pub fn new(config: &Config) -> Result<Self, StoreError> {
        let base_dir = match config.base_dir() {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
                dir.canonicalize().map_err(|e| io_error(dir, e))?
            }
            None => {
                let cwd = std::env::current_dir().map_err(|e| io_error(Path::new("."), e))?;
                cwd.canonicalize().map_err(|e| io_error(&cwd, e))?
            }
        };

        Ok(Self {
            inner: Arc::new(StoreInner {
                settings: Settings {
                    base_dir,
                    default_format: config.default_format(),
                    max_uncommitted_changes: config.max_uncommitted_changes(),
                    sync_writes: config.sync_writes(),
                },
                table: Mutex::new(Table::default()),
            }),
        })
    }

    /// A store with default settings rooted at `base_dir`.
    pub fn in_dir(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::new(&Config::with_base_dir(base_dir))
    }

    /// Directory relative paths resolve against.
    pub fn base_dir(&self) -> &Path {
        &self.inner.settings.base_dir
    }

    /// Format used when a path's extension gives no hint.
    pub fn default_format(&self) -> Format {
        self.inner.settings.default_format
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        // table updates are single assignments; a poisoned lock is still consistent
        self.inner.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Normalize a caller path against the base directory.
    pub fn normalize(&self, path: impl AsRef<Path>) -> Result<NormalizedPath, StoreError> {
        let path = path.as_ref();
        NormalizedPath::resolve(path, self.base_dir()).map_err(|e| io_error(path, e))
    }

    /// Turn [`Format::Automatic`] into a concrete format for `path`.
    pub fn resolve_format(&self, path: impl AsRef<Path>, format: Format) -> Result<Format, StoreError> {
        Ok(format.resolve(path.as_ref(), self.default_format())?)
    }

    fn writer_for(&self, key: &NormalizedPath) -> AtomicWriter {
        AtomicWriter::new(DocumentPaths::for_document(key)).with_sync(self.inner.settings.sync_writes)
    }

    // =========================================================================
    // Open
    // =========================================================================

    /// Open a serde document, inferring the format from the extension.
    ///
    /// A missing file is created from `T::default()`.
    pub fn open<T>(&self, path: impl AsRef<Path>) -> Result<DocFile<T>, StoreError>
    where
        T: Serialize + DeserializeOwned + Default + Send + 'static,
    {
        self.open_as(path, Format::Automatic)
    }

    /// Open a serde document in an explicit format.
    ///
    /// The format only matters when this call creates the handle; reopening
    /// a live path shares the existing handle and its codec.
    pub fn open_as<T>(&self, path: impl AsRef<Path>, format: Format) -> Result<DocFile<T>, StoreError>
    where
        T: Serialize + DeserializeOwned + Default + Send + 'static,
    {
        let key = self.normalize(path)?;
        let format = self.resolve_format(key.as_path(), format)?;
        let codec: Arc<dyn Codec<T>> = Arc::new(SerdeCodec::new(format)?);
        self.open_normalized(key, codec, T::default)
    }

    /// Open a document with an explicit codec and default-value factory.
    pub fn open_with<T, F>(
        &self,
        path: impl AsRef<Path>,
        codec: Arc<dyn Codec<T>>,
        default: F,
    ) -> Result<DocFile<T>, StoreError>
    where
        T: Send + 'static,
        F: FnOnce() -> T,
    {
        let key = self.normalize(path)?;
        self.open_normalized(key, codec, default)
    }

    /// Open the document named after `T` in the base directory.
    ///
    /// `Vec<app::Item>` lives in `Vec(Item).json` under the default format.
    pub fn open_default<T>(&self) -> Result<DocFile<T>, StoreError>
    where
        T: Serialize + DeserializeOwned + Default + Send + 'static,
    {
        let format = self.default_format();
        let ext = format.extension().unwrap_or("json");
        let name = format!("{}.{}", friendly_type_name(any::type_name::<T>()), ext);
        self.open_as(name, format)
    }

    fn open_normalized<T, F>(
        &self,
        key: NormalizedPath,
        codec: Arc<dyn Codec<T>>,
        default: F,
    ) -> Result<DocFile<T>, StoreError>
    where
        T: Send + 'static,
        F: FnOnce() -> T,
    {
        let caller = thread::current().id();
        let mut table = self.lock();
        if table.closed {
            return Err(StoreError::Closed);
        }

        let handle: Arc<Handle<T>> = match table.entries.get_mut(&key) {
            Some(entry) => {
                let owner = entry.handle.owner();
                if owner != caller {
                    return Err(StoreError::ThreadAffinity {
                        path: key.as_path().to_path_buf(),
                        owner,
                        caller,
                    });
                }

                let mismatch = || StoreError::TypeMismatch {
                    path: key.as_path().to_path_buf(),
                    open_as: entry.type_name,
                    requested: any::type_name::<T>(),
                };
                if entry.type_id != TypeId::of::<T>() {
                    return Err(mismatch());
                }
                let handle = Arc::clone(&entry.handle)
                    .into_any()
                    .downcast::<Handle<T>>()
                    .map_err(|_| mismatch())?;

                entry.refcount += 1;
                tracing::debug!(path = %key, refcount = entry.refcount, "shared open document");
                handle
            }
            None => {
                let handle = Arc::new(Handle::create(self.writer_for(&key), codec, default)?);
                table.entries.insert(
                    key.clone(),
                    Entry {
                        handle: handle.clone(),
                        type_id: TypeId::of::<T>(),
                        type_name: any::type_name::<T>(),
                        refcount: 1,
                    },
                );
                tracing::debug!(path = %key, "opened document");
                handle
            }
        };
        drop(table);

        Ok(DocFile::new(
            self.clone(),
            key,
            handle,
            self.inner.settings.max_uncommitted_changes,
        ))
    }

    // =========================================================================
    // Release
    // =========================================================================

    /// Drop one reference; the last one commits and evicts the handle.
    ///
    /// If that final commit fails, the reference stays counted and the error
    /// is returned so the caller can retry or discard.
    pub(crate) fn release<T: Send + 'static>(
        &self,
        key: &NormalizedPath,
        handle: &Arc<Handle<T>>,
    ) -> Result<(), StoreError> {
        handle.check_access()?;

        let mut table = self.lock();
        let entry = match table.entries.get_mut(key) {
            Some(entry) if same_handle(&entry.handle, handle) => entry,
            _ => return Err(StoreError::AccessAfterRelease(key.as_path().to_path_buf())),
        };

        entry.refcount -= 1;
        if entry.refcount > 0 {
            tracing::debug!(path = %key, refcount = entry.refcount, "released reference");
            return Ok(());
        }

        if let Err(err) = handle.commit_unchecked() {
            entry.refcount = 1;
            return Err(err);
        }

        table.entries.remove(key);
        handle.mark_released();
        tracing::debug!(path = %key, "closed document");
        Ok(())
    }

    /// Evict a handle without writing, whatever its refcount.
    pub(crate) fn discard<T: Send + 'static>(
        &self,
        key: &NormalizedPath,
        handle: &Arc<Handle<T>>,
    ) -> Result<(), StoreError> {
        if handle.is_released() {
            return Err(StoreError::AccessAfterRelease(key.as_path().to_path_buf()));
        }

        let mut table = self.lock();
        if matches!(table.entries.get(key), Some(entry) if same_handle(&entry.handle, handle)) {
            table.entries.remove(key);
        }
        handle.mark_released();
        tracing::debug!(path = %key, "discarded document without writing");
        Ok(())
    }

    /// Close the store.
    ///
    /// Later opens fail with [`StoreError::Closed`]. Documents owned by the
    /// calling thread get a final commit; every entry is evicted and every
    /// outstanding reference reports [`StoreError::AccessAfterRelease`].
    pub fn shutdown(&self) -> ShutdownReport {
        let caller = thread::current().id();
        let mut table = self.lock();
        table.closed = true;

        let mut report = ShutdownReport::default();
        for (key, entry) in table.entries.drain() {
            let path = key.as_path().to_path_buf();
            if entry.handle.owner() != caller {
                report.abandoned.push(path);
            } else {
                match entry.handle.final_commit() {
                    Ok(_) => report.committed.push(path),
                    Err(err) => report.failed.push((path, err)),
                }
            }
            entry.handle.mark_released();
        }

        tracing::debug!(
            committed = report.committed.len(),
            abandoned = report.abandoned.len(),
            failed = report.failed.len(),
            "document store shut down"
        );
        report
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Paths of all registered documents.
    pub fn open_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .lock()
            .entries
            .values()
            .map(|entry| entry.handle.path().to_path_buf())
            .collect();
        paths.sort();
        paths
    }

    /// Live references to `path`, or `None` when it is not open.
    pub fn refcount(&self, path: impl AsRef<Path>) -> Result<Option<usize>, StoreError> {
        let key = self.normalize(path)?;
        Ok(self.lock().entries.get(&key).map(|entry| entry.refcount))
    }

    pub fn is_open(&self, path: impl AsRef<Path>) -> Result<bool, StoreError> {
        Ok(self.refcount(path)?.is_some())
    }

    // =========================================================================
    // Operations on unopened paths
    // =========================================================================

    /// Write a value to `path` once, without registering a handle.
    ///
    /// Runs recovery first, then commits through the same protocol as an
    /// open document.
    pub fn save<T>(&self, value: &T, path: impl AsRef<Path>, format: Format) -> Result<(), StoreError>
    where
        T: Serialize + ?Sized,
    {
        let key = self.normalize(path)?;
        let codec = SerdeCodec::new(self.resolve_format(key.as_path(), format)?)?;
        let bytes = codec.encode_value(value)?;

        let table = self.lock();
        if table.entries.contains_key(&key) {
            return Err(StoreError::AlreadyOpen(key.as_path().to_path_buf()));
        }

        let writer = self.writer_for(&key);
        writer.recover()?;
        let mode = if writer.status()?.canonical {
            CommitMode::Replace
        } else {
            CommitMode::FirstWrite
        };
        writer.commit(&bytes, mode)?;
        drop(table);
        Ok(())
    }

    /// Run only the recovery step for a path that is not open.
    pub fn recover(&self, path: impl AsRef<Path>) -> Result<RecoveryOutcome, StoreError> {
        let key = self.normalize(path)?;
        let table = self.lock();
        if table.entries.contains_key(&key) {
            return Err(StoreError::AlreadyOpen(key.as_path().to_path_buf()));
        }
        let outcome = self.writer_for(&key).recover()?;
        drop(table);
        Ok(outcome)
    }

    /// Which protocol artifacts exist for `path`.
    pub fn artifacts(&self, path: impl AsRef<Path>) -> Result<ArtifactStatus, StoreError> {
        let key = self.normalize(path)?;
        Ok(self.writer_for(&key).status()?)
    }
}

fn same_handle<T>(erased: &Arc<dyn ErasedHandle>, handle: &Arc<Handle<T>>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(erased) as *const (),
        Arc::as_ptr(handle) as *const (),
    )
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}
