//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Commands
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `init [path]` | Create `.typings/` with a commented config |
//! | `check [--install]` | Report dependencies without typings, optionally install them |
//! | `daemon start/stop/status/logs` | Run and inspect the background watcher |
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Verbose Mode
//!
//! Use `--verbose` (or `-v`) for debug output:
//! ```bash
//! typings --verbose check
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod check;
mod daemon;
mod output;

pub use app::{Cli, Commands, run};
pub use daemon::DaemonCommands;
pub use output::{Output, OutputFormat};
