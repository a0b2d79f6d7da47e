//! core::ops::writer
//!
//! Crash-safe commit protocol for a single document path.
//!
//! # Commit Protocol
//!
//! 1. Write the new bytes to the scratch file (created or truncated), fsync.
//! 2. First write (no canonical file yet): rename scratch → canonical.
//! 3. Replace: rename canonical → marker, rename scratch → canonical,
//!    delete marker.
//!
//! At every instant either the marker or the canonical file (or both,
//! briefly) holds valid committed content.
//!
//! # Recovery Contract
//!
//! [`AtomicWriter::recover`] runs once before a document is loaded:
//!
//! - A present marker always means a replace did not finish, because a
//!   successful replace deletes the marker as its last step. The marker is
//!   renamed back onto the canonical path, overwriting whatever is there.
//! - A leftover scratch file never holds committed data and is deleted.
//!
//! A crash after the swap but before the marker is deleted therefore loses
//! the last commit only; earlier history is never lost.
//!
//! # Fault Injection
//!
//! When compiled with `cfg(test)` or the `fault_injection` feature, the
//! protocol can stop at a chosen [`fault_injection::CrashPoint`] to simulate
//! a process crash between steps.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::paths::DocumentPaths;

/// Errors from the commit and recovery protocol.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Reading the canonical file failed.
    #[error("failed to read '{path}': {source}")]
    Read { path: PathBuf, source: io::Error },

    /// Writing the scratch file failed. The canonical file is untouched.
    #[error("failed to write scratch file '{path}': {source}")]
    Scratch { path: PathBuf, source: io::Error },

    /// A rename step failed.
    #[error("failed to rename '{from}' to '{to}': {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    /// Removing a protocol artifact failed.
    #[error("failed to remove '{path}': {source}")]
    Remove { path: PathBuf, source: io::Error },

    /// The document directory could not be created.
    #[error("failed to create directory '{path}': {source}")]
    CreateDir { path: PathBuf, source: io::Error },
}

/// How a commit swaps the new bytes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    /// No canonical file exists yet; rename scratch straight into place.
    FirstWrite,
    /// Protect the existing canonical file with the transaction marker.
    Replace,
}

/// What the recovery step did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryOutcome {
    /// A transaction marker was moved back onto the canonical path.
    pub restored_marker: bool,
    /// A stale scratch file was deleted.
    pub removed_scratch: bool,
}

impl RecoveryOutcome {
    /// True when there was nothing to recover.
    pub fn is_clean(&self) -> bool {
        !self.restored_marker && !self.removed_scratch
    }
}

/// Which protocol artifacts currently exist on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArtifactStatus {
    pub canonical: bool,
    pub scratch: bool,
    pub marker: bool,
}

impl ArtifactStatus {
    /// True when a commit was interrupted and recovery has work to do.
    pub fn needs_recovery(&self) -> bool {
        self.scratch || self.marker
    }
}

/// Executes the commit and recovery protocol for one document.
#[derive(Debug, Clone)]
pub struct AtomicWriter {
    paths: DocumentPaths,
    /// fsync the scratch file before it is renamed into place.
    sync: bool,
}

impl AtomicWriter {
    /// Create a writer for a document's artifacts. Syncing is on.
    pub fn new(paths: DocumentPaths) -> Self {
        Self { paths, sync: true }
    }

    /// Enable or disable fsync of the scratch file.
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// The artifact paths this writer manages.
    pub fn paths(&self) -> &DocumentPaths {
        &self.paths
    }

    /// Restore the last committed state after an interrupted commit.
    ///
    /// Idempotent: a second call on a clean directory does nothing.
    pub fn recover(&self) -> Result<RecoveryOutcome, WriteError> {
        let mut outcome = RecoveryOutcome::default();

        if exists(&self.paths.marker)? {
            self.rename(&self.paths.marker, &self.paths.canonical)?;
            outcome.restored_marker = true;
            tracing::info!(
                path = %self.paths.canonical.display(),
                "restored interrupted commit from transaction marker"
            );
        }

        match fs::remove_file(&self.paths.scratch) {
            Ok(()) => {
                outcome.removed_scratch = true;
                tracing::info!(
                    path = %self.paths.scratch.display(),
                    "removed stale scratch file"
                );
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(WriteError::Remove {
                    path: self.paths.scratch.clone(),
                    source: e,
                })
            }
        }

        Ok(outcome)
    }

    /// Read the canonical file, or `None` if it does not exist.
    pub fn read_canonical(&self) -> Result<Option<Vec<u8>>, WriteError> {
        match fs::read(&self.paths.canonical) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(WriteError::Read {
                path: self.paths.canonical.clone(),
                source: e,
            }),
        }
    }

    /// Report which artifacts exist.
    pub fn status(&self) -> Result<ArtifactStatus, WriteError> {
        Ok(ArtifactStatus {
            canonical: exists(&self.paths.canonical)?,
            scratch: exists(&self.paths.scratch)?,
            marker: exists(&self.paths.marker)?,
        })
    }

    /// Commit `bytes` to the canonical path.
    ///
    /// Creates the document directory if needed. Errors are returned as-is;
    /// retry policy belongs to the caller.
    pub fn commit(&self, bytes: &[u8], mode: CommitMode) -> Result<(), WriteError> {
        self.ensure_dir()?;
        self.write_scratch(bytes)?;

        match mode {
            CommitMode::FirstWrite => {
                self.rename(&self.paths.scratch, &self.paths.canonical)?;
            }
            CommitMode::Replace => {
                self.rename(&self.paths.canonical, &self.paths.marker)?;

                #[cfg(any(test, feature = "fault_injection"))]
                if fault_injection::should_crash(fault_injection::CrashPoint::AfterMarkerRename) {
                    return Err(WriteError::Rename {
                        from: self.paths.scratch.clone(),
                        to: self.paths.canonical.clone(),
                        source: fault_injection::simulated_crash(),
                    });
                }

                self.rename(&self.paths.scratch, &self.paths.canonical)?;

                #[cfg(any(test, feature = "fault_injection"))]
                if fault_injection::should_crash(fault_injection::CrashPoint::AfterSwap) {
                    return Err(WriteError::Remove {
                        path: self.paths.marker.clone(),
                        source: fault_injection::simulated_crash(),
                    });
                }

                fs::remove_file(&self.paths.marker).map_err(|e| WriteError::Remove {
                    path: self.paths.marker.clone(),
                    source: e,
                })?;
            }
        }

        tracing::debug!(
            path = %self.paths.canonical.display(),
            bytes = bytes.len(),
            ?mode,
            "committed document"
        );
        Ok(())
    }

    fn ensure_dir(&self) -> Result<(), WriteError> {
        if let Some(dir) = self.paths.dir() {
            fs::create_dir_all(dir).map_err(|e| WriteError::CreateDir {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }

    fn write_scratch(&self, bytes: &[u8]) -> Result<(), WriteError> {
        let scratch_err = |e: io::Error| WriteError::Scratch {
            path: self.paths.scratch.clone(),
            source: e,
        };

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.paths.scratch)
            .map_err(scratch_err)?;

        #[cfg(any(test, feature = "fault_injection"))]
        if fault_injection::should_crash(fault_injection::CrashPoint::DuringScratchWrite) {
            let partial = &bytes[..bytes.len() / 2];
            file.write_all(partial).map_err(scratch_err)?;
            return Err(scratch_err(fault_injection::simulated_crash()));
        }

        file.write_all(bytes).map_err(scratch_err)?;
        if self.sync {
            file.sync_all().map_err(scratch_err)?;
        }
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), WriteError> {
        fs::rename(from, to).map_err(|e| WriteError::Rename {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source: e,
        })
    }
}

fn exists(path: &Path) -> Result<bool, WriteError> {
    path.try_exists().map_err(|e| WriteError::Read {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Fault injection for crash-recovery testing.
///
/// A crash point is armed per thread and fires once: the commit stops at
/// that point and returns an I/O error, leaving the files exactly as a
/// process crash would.
///
/// # Example
///
/// ```ignore
/// fault_injection::set_crash_at(CrashPoint::AfterMarkerRename);
/// assert!(writer.commit(b"new", CommitMode::Replace).is_err());
/// writer.recover()?; // old content is back
/// ```
#[cfg(any(test, feature = "fault_injection"))]
pub mod fault_injection {
    use std::cell::Cell;
    use std::io;

    /// Where in the protocol to stop.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum CrashPoint {
        /// Half of the bytes reached the scratch file.
        DuringScratchWrite,
        /// The canonical file was moved to the marker; the new file is not in place.
        AfterMarkerRename,
        /// The new file is in place; the marker was not deleted.
        AfterSwap,
    }

    thread_local! {
        static ARMED: Cell<Option<CrashPoint>> = const { Cell::new(None) };
    }

    /// Arm a crash point for the current thread.
    pub fn set_crash_at(point: CrashPoint) {
        ARMED.with(|armed| armed.set(Some(point)));
    }

    /// Disarm any pending crash point.
    pub fn reset() {
        ARMED.with(|armed| armed.set(None));
    }

    /// Check (and consume) the armed crash point.
    pub fn should_crash(point: CrashPoint) -> bool {
        ARMED.with(|armed| {
            if armed.get() == Some(point) {
                armed.set(None);
                true
            } else {
                false
            }
        })
    }

    pub(crate) fn simulated_crash() -> io::Error {
        io::Error::other("simulated crash for fault injection testing")
    }
}
