//! # Storage Layer
//!
//! Everything typings reads from or writes to disk.
//!
//! ## Files
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Manifests | JSON | `<project>/package.json` |
//! | Workspace config | TOML | `.typings/config.toml` |
//! | Global config | TOML | `~/.config/typings/config.toml` |
//! | Daemon PID | text | `.typings/daemon.pid` |
//! | Daemon log | text, rotated | `.typings/daemon.log` |
//!
//! ## Workspace Structure
//!
//! ```text
//! workspace/
//! ├── .typings/
//! │   ├── config.toml       # Workspace configuration
//! │   ├── daemon.pid        # Running daemon (if any)
//! │   ├── daemon.log        # Daemon log, rotated at 1MB
//! │   └── .gitignore        # Ignores daemon state
//! ├── package.json          # A project
//! └── packages/
//!     └── web/
//!         ├── package.json  # Another project
//!         └── tsconfig.json # Opts this project into auto-typing
//! ```
//!
//! ## Key Types
//!
//! - [`Workspace`] - Entry point: root, config, project discovery
//! - [`Config`] - Workspace and global configuration
//! - [`DaemonLog`] - Timestamped, shareable log sink
//! - [`PidFile`] - Daemon liveness, see [`DaemonState`]
//! - [`read_manifest`] - Lenient `package.json` reader

mod config;
mod log;
mod manifest;
mod pidfile;
mod workspace;

pub use config::{Config, ConfigError, DaemonConfig, GlobalConfig, ProjectOverride, WorkspaceConfig, STATE_DIR};
pub use log::{
    rotate_logs_if_needed, tail_lines, DaemonLog, Level, LogFollower, LogTail, LOG_ROTATION_COUNT,
    MAX_LOG_SIZE,
};
pub use manifest::{package_ships_types, read_manifest, MANIFEST_FILE, TSCONFIG_FILE};
pub use pidfile::{process_alive, terminate, DaemonState, PidFile};
pub use workspace::{
    is_excluded_dir, is_excluded_path, is_inside_node_modules, Workspace, WorkspaceError, NODE_MODULES,
};
