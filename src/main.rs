//! Strata CLI - Changeset staging for layered architecture models

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = strata_cli::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
