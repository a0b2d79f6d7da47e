//! migrate command - Rewrite a document in another format

use std::path::Path;

use anyhow::{Context as _, Result};

use super::open_document;
use crate::cli::Context;
use crate::core::format::Format;
use crate::ui::output;

/// Re-encode a document. Always rewrites the file.
pub fn migrate(ctx: &Context, path: &Path, to: Format) -> Result<()> {
    let mut doc = open_document(ctx, path, None)?;
    let target = ctx.store.resolve_format(doc.path(), to)?;

    doc.migrate_to_format(target)
        .with_context(|| format!("Failed to migrate {} to {}", path.display(), target))?;
    doc.release()?;

    output::success(
        format!("Migrated {} to {}", path.display(), target),
        ctx.verbosity,
    );
    Ok(())
}
