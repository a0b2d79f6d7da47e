//! docfile - shared, crash-safe document files
//!
//! A process-local store maps each file path to one in-memory document.
//! Every open of the same path shares that document; the last reference to
//! go away writes it back. Writes go through a scratch file and a
//! transaction marker so a crash never leaves a torn file.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to store)
//! - [`store`] - Registry, references, throttling, thread affinity
//! - [`core`] - Paths, codecs, the atomic writer, configuration
//! - [`ui`] - User-facing output
//!
//! # Correctness Invariants
//!
//! 1. At most one in-memory document exists per normalized path
//! 2. The canonical file always holds a complete serialized document
//! 3. A crash between renames is repaired before the next read
//! 4. A document is only touched by the thread that opened it

pub mod cli;
pub mod core;
pub mod store;
pub mod ui;
