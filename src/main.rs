//! docfile binary entry point.

use std::process::ExitCode;

fn main() -> ExitCode {
    match docfile::cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            docfile::ui::output::error(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}
