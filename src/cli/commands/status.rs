//! status command - Show which protocol files exist for a document

use std::path::Path;

use anyhow::Result;

use crate::cli::Context;
use crate::core::paths::DocumentPaths;
use crate::ui::output;

pub fn status(ctx: &Context, path: &Path) -> Result<()> {
    let key = ctx.store.normalize(path)?;
    let paths = DocumentPaths::for_document(&key);
    let artifacts = ctx.store.artifacts(path)?;

    let show = |label: &str, file: &Path, present: bool| {
        let state = if present { "present" } else { "absent" };
        println!("{:<10} {:<8} {}", label, state, file.display());
    };
    show("document", &paths.canonical, artifacts.canonical);
    show("scratch", &paths.scratch, artifacts.scratch);
    show("marker", &paths.marker, artifacts.marker);

    if artifacts.needs_recovery() {
        output::warn(
            format!(
                "interrupted write detected; run `docfile recover {}`",
                path.display()
            ),
            ctx.verbosity,
        );
    }
    Ok(())
}
