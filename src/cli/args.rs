//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--config <path>`: Read configuration from this file
//! - `--base-dir <dir>`: Resolve relative document paths against this directory
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::core::format::Format;

/// docfile - inspect and edit crash-safe document files
#[derive(Parser, Debug)]
#[command(name = "docfile")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Read configuration from this file instead of the standard locations
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Resolve relative document paths against this directory
    #[arg(long, global = true, value_name = "DIR")]
    pub base_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print a document as pretty JSON
    #[command(
        name = "show",
        long_about = "Print a document as pretty JSON.\n\n\
            Opens the document the same way a program using the store would: any \
            interrupted write is recovered first, and a missing file is created \
            holding an empty object.",
        after_help = "\
EXAMPLES:
    docfile show settings.json
    docfile show state.conf --format toml"
    )]
    Show {
        /// Document path
        path: PathBuf,

        /// Format to read the document in (default: from extension)
        #[arg(long, value_name = "FORMAT")]
        format: Option<Format>,
    },

    /// Set a value at a JSON pointer and commit
    #[command(
        name = "set",
        long_about = "Set a value at a JSON pointer and commit the document.\n\n\
            Missing intermediate objects are created. The value is parsed as JSON; \
            quote strings as you would in a JSON file.",
        after_help = "\
EXAMPLES:
    docfile set settings.json /window/width 1280
    docfile set settings.json /theme '\"dark\"'
    docfile set settings.json /recent/- '\"notes.md\"'   # append to an array"
    )]
    Set {
        /// Document path
        path: PathBuf,

        /// JSON pointer (RFC 6901), e.g. `/a/b/0`
        pointer: String,

        /// JSON value to store
        value: String,

        /// Format to read and write the document in (default: from extension)
        #[arg(long, value_name = "FORMAT")]
        format: Option<Format>,
    },

    /// Rewrite a document in another format
    #[command(
        name = "migrate",
        after_help = "\
EXAMPLES:
    docfile migrate settings.json --to compact-json
    docfile migrate settings.json --to toml"
    )]
    Migrate {
        /// Document path
        path: PathBuf,

        /// Target format: json, compact-json, toml, or auto
        #[arg(long, value_name = "FORMAT")]
        to: Format,
    },

    /// Repair a document left behind by an interrupted write
    #[command(
        name = "recover",
        long_about = "Repair a document left behind by an interrupted write.\n\n\
            If a transaction marker exists it is renamed back onto the document \
            path, and a stale scratch file is deleted. The document is not parsed."
    )]
    Recover {
        /// Document path
        path: PathBuf,
    },

    /// Show which files of the write protocol exist for a document
    #[command(name = "status")]
    Status {
        /// Document path
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["docfile", "status", "a.json", "--base-dir", "/tmp", "-q"])
            .expect("parse");
        assert!(cli.quiet);
        assert_eq!(cli.base_dir, Some(PathBuf::from("/tmp")));
        assert!(matches!(cli.command, Command::Status { .. }));
    }

    #[test]
    fn parses_format_names() {
        let cli = Cli::try_parse_from(["docfile", "migrate", "a.json", "--to", "toml"])
            .expect("parse");
        match cli.command {
            Command::Migrate { to, .. } => assert_eq!(to, Format::Toml),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_binary_format() {
        let result = Cli::try_parse_from(["docfile", "migrate", "a.json", "--to", "bson"]);
        assert!(result.is_err());
    }
}
