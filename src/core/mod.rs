//! core
//!
//! Building blocks below the document store.
//!
//! # Modules
//!
//! - [`paths`] - Path normalization and protocol file names
//! - [`format`] - Formats and codecs
//! - [`ops`] - Atomic commit and recovery
//! - [`config`] - Configuration schema and loading
//!
//! Nothing in `core` knows about handles, references, or threads.

pub mod config;
pub mod format;
pub mod ops;
pub mod paths;
