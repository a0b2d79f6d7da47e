//! store::errors
//!
//! Error type for the document store.
//!
//! # Design
//!
//! Misuse of a reference (wrong thread, use after release, wrong type) is
//! reported through the normal error channel and is never retried. I/O and
//! codec failures from the layers below convert in via `From`.
//!
//! # Example
//!
//! ```
//! use docfile::store::StoreError;
//! use std::path::PathBuf;
//!
//! let err = StoreError::AccessAfterRelease(PathBuf::from("/data/a.json"));
//! assert!(err.to_string().contains("released"));
//! ```

use std::path::PathBuf;
use std::thread::ThreadId;

use thiserror::Error;

use crate::core::format::CodecError;
use crate::core::ops::WriteError;

/// Errors from document store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The document is owned by another thread.
    #[error("document '{path}' is owned by thread {owner:?}, not {caller:?}")]
    ThreadAffinity {
        path: PathBuf,
        owner: ThreadId,
        caller: ThreadId,
    },

    /// The reference (or the shared document behind it) was released.
    #[error("document '{0}' has already been released")]
    AccessAfterRelease(PathBuf),

    /// No codec exists for the requested format.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The path is already open with a different document type.
    #[error("document '{path}' is open as {open_as}, cannot open it as {requested}")]
    TypeMismatch {
        path: PathBuf,
        open_as: &'static str,
        requested: &'static str,
    },

    /// The content is borrowed through another reference on this thread.
    #[error("content of '{0}' is already borrowed through another reference")]
    ContentBusy(PathBuf),

    /// The store has been shut down.
    #[error("document store has been shut down")]
    Closed,

    /// A one-shot operation targeted a path with a live handle.
    #[error("document '{0}' is open; use its handle instead")]
    AlreadyOpen(PathBuf),

    /// Encoding or decoding failed.
    #[error(transparent)]
    Codec(CodecError),

    /// The commit or recovery protocol failed.
    #[error(transparent)]
    Write(#[from] WriteError),

    /// Filesystem error outside the commit protocol.
    #[error("i/o error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<CodecError> for StoreError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::UnsupportedFormat(format) => StoreError::UnsupportedFormat(format),
            other => StoreError::Codec(other),
        }
    }
}

impl StoreError {
    /// True for errors caused by using a reference incorrectly, as opposed
    /// to I/O or data errors.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            StoreError::ThreadAffinity { .. }
                | StoreError::AccessAfterRelease(_)
                | StoreError::TypeMismatch { .. }
                | StoreError::ContentBusy(_)
                | StoreError::Closed
                | StoreError::AlreadyOpen(_)
        )
    }
}
