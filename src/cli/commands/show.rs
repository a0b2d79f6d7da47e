//! show command - Print a document as pretty JSON

use std::path::Path;

use anyhow::Result;

use super::open_document;
use crate::cli::Context;
use crate::core::format::{to_pretty_json, Format};

/// Print a document, creating it first if it does not exist.
pub fn show(ctx: &Context, path: &Path, format: Option<Format>) -> Result<()> {
    let mut doc = open_document(ctx, path, format)?;
    let text = doc.read(|value| to_pretty_json(value))??;
    doc.release()?;

    println!("{}", text);
    Ok(())
}
