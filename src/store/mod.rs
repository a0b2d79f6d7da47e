//! store
//!
//! Process-local registry of shared, persisted documents.
//!
//! # Modules
//!
//! - [`registry`] - [`DocumentStore`], the path → handle table
//! - [`document`] - [`DocFile`], one reference to an open document
//! - [`handle`] - Shared per-path state and commit logic
//! - [`throttle`] - Per-reference change counting
//! - [`errors`] - [`StoreError`]
//!
//! # Threading
//!
//! A document belongs to the thread that opened it. Other threads may hold
//! a `DocumentStore` clone and open other paths, but opening, reading,
//! committing, or releasing someone else's document fails with
//! [`StoreError::ThreadAffinity`].

pub mod document;
pub mod errors;
pub(crate) mod handle;
pub mod registry;
pub mod throttle;

pub use document::DocFile;
pub use errors::StoreError;
pub use handle::{CommitOutcome, ContentGuard};
pub use registry::{DocumentStore, ShutdownReport};
pub use throttle::ChangeThrottle;
