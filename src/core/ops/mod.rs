//! core::ops
//!
//! Crash-safe file replacement.
//!
//! # Modules
//!
//! - [`writer`] - Scratch-file, rename, and transaction-marker protocol
//!
//! # Protocol
//!
//! For a canonical path `dir/name`:
//! 1. Write and fsync `dir/$name.tmp`
//! 2. First write: rename scratch onto the canonical path
//! 3. Replace: rename canonical to `name.transaction`, rename scratch onto
//!    canonical, delete the marker
//!
//! A marker left behind by a crash is renamed back onto the canonical path
//! the next time the document is opened or recovered.
//!
//! # Example
//!
//! ```no_run
//! use docfile::core::ops::{AtomicWriter, CommitMode};
//! use docfile::core::paths::DocumentPaths;
//!
//! let writer = AtomicWriter::new(DocumentPaths::for_canonical("/data/a.json".into()));
//! writer.recover()?;
//! writer.commit(b"{}", CommitMode::FirstWrite)?;
//! # Ok::<(), docfile::core::ops::WriteError>(())
//! ```

pub mod writer;

pub use writer::{ArtifactStatus, AtomicWriter, CommitMode, RecoveryOutcome, WriteError};

#[cfg(any(test, feature = "fault_injection"))]
pub use writer::fault_injection;
