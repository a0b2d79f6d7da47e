//! recover command - Repair a document left behind by an interrupted write

use std::path::Path;

use anyhow::{Context as _, Result};

use crate::cli::Context;
use crate::ui::output;

/// Run the recovery step without opening the document.
pub fn recover(ctx: &Context, path: &Path) -> Result<()> {
    let outcome = ctx
        .store
        .recover(path)
        .with_context(|| format!("Failed to recover {}", path.display()))?;

    if outcome.is_clean() {
        output::print("Nothing to recover", ctx.verbosity);
        return Ok(());
    }
    if outcome.restored_marker {
        output::success(
            format!("Restored {} from its transaction marker", path.display()),
            ctx.verbosity,
        );
    }
    if outcome.removed_scratch {
        output::success("Removed stale scratch file", ctx.verbosity);
    }
    Ok(())
}
