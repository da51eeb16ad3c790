//! typings - automatic `@types` installation

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = typings_cli::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
