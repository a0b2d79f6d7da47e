//! cli
//!
//! Command-line interface layer for docfile.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install the log subscriber
//! - Load configuration and build the [`DocumentStore`]
//! - Delegate to command handlers, then shut the store down
//!
//! # Architecture
//!
//! The CLI layer is thin. Handlers only talk to the store; the atomic
//! writer and codecs stay behind it.

pub mod args;
pub mod commands;

pub use args::{Cli, Command};

use anyhow::{Context as _, Result};
use tracing_subscriber::EnvFilter;

use crate::core::config::Config;
use crate::store::DocumentStore;
use crate::ui::output::{self, Verbosity};

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "DOCFILE_LOG";

/// State shared by every command handler.
#[derive(Debug)]
pub struct Context {
    pub store: DocumentStore,
    pub verbosity: Verbosity,
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    setup_tracing(cli.debug);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().context("Failed to load config")?,
    };
    // CLI flag always takes precedence over the file
    if let Some(dir) = &cli.base_dir {
        config.store.base_dir = Some(dir.clone());
    }

    let ctx = Context {
        store: DocumentStore::new(&config).context("Failed to initialize document store")?,
        verbosity: Verbosity::from_flags(cli.quiet, cli.debug),
    };
    match config.loaded_from() {
        Some(path) => output::debug(format!("config: {}", path.display()), ctx.verbosity),
        None => output::debug("config: defaults", ctx.verbosity),
    }
    output::debug(
        format!("base dir: {}", ctx.store.base_dir().display()),
        ctx.verbosity,
    );

    let result = commands::dispatch(cli.command, &ctx);

    let report = ctx.store.shutdown();
    for (path, err) in &report.failed {
        output::warn(
            format!("{} was not saved: {}", path.display(), err),
            ctx.verbosity,
        );
    }

    result
}

/// Send `tracing` events to stderr.
///
/// `DOCFILE_LOG` takes a filter directive; without it only warnings show,
/// or everything from this crate under `--debug`.
fn setup_tracing(debug: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("docfile=debug,warn")
        } else {
            EnvFilter::new("warn")
        }
    });

    // a subscriber may already be installed when run() is embedded
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
