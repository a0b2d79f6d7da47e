//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Validates command-specific arguments
//! 2. Opens documents through the [`DocumentStore`](crate::store::DocumentStore)
//! 3. Formats and displays output
//!
//! Handlers never touch document files directly. CLI documents are
//! untyped [`serde_json::Value`]s; a missing file starts as `{}`.

mod migrate;
mod recover;
mod set;
mod show;
mod status;

// Re-export command functions for testing and direct invocation
pub use migrate::migrate;
pub use recover::recover;
pub use set::set;
pub use show::show;
pub use status::status;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use serde_json::{Map, Value};

use super::args::Command;
use super::Context;
use crate::core::format::{Codec, Format, SerdeCodec};
use crate::store::DocFile;

/// Dispatch a parsed command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Show { path, format } => show(ctx, &path, format),
        Command::Set {
            path,
            pointer,
            value,
            format,
        } => set(ctx, &path, &pointer, &value, format),
        Command::Migrate { path, to } => migrate(ctx, &path, to),
        Command::Recover { path } => recover(ctx, &path),
        Command::Status { path } => status(ctx, &path),
    }
}

/// Open an untyped document, creating `{}` when the file is missing.
fn open_document(ctx: &Context, path: &Path, format: Option<Format>) -> Result<DocFile<Value>> {
    let format = ctx
        .store
        .resolve_format(path, format.unwrap_or(Format::Automatic))?;
    let codec: Arc<dyn Codec<Value>> = Arc::new(SerdeCodec::new(format)?);

    ctx.store
        .open_with(path, codec, || Value::Object(Map::new()))
        .with_context(|| format!("Failed to open {}", path.display()))
}
