//! Workspace management
//!
//! A workspace is the directory tree the daemon watches. It may contain any
//! number of projects (directories holding a `package.json`).

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;
use walkdir::WalkDir;

use super::config::{Config, STATE_DIR};
use super::manifest::MANIFEST_FILE;
use super::pidfile::PidFile;

/// Directory that never contains projects of its own
pub const NODE_MODULES: &str = "node_modules";

/// Directories whose subtrees never hold projects
const EXCLUDED_DIRS: [&str; 3] = [NODE_MODULES, STATE_DIR, ".git"];

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Workspace root is not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// A typings workspace
pub struct Workspace {
    root: PathBuf,
    config: Config,
}

impl Workspace {
    /// Opens the workspace rooted at the given path
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(WorkspaceError::NotADirectory(root).into());
        }

        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve workspace root: {}", root.display()))?;
        let config = Config::for_workspace(&root)?;

        Ok(Self { root, config })
    }

    /// Opens the nearest initialized workspace above the current directory,
    /// or the current directory itself
    pub fn open_current() -> Result<Self> {
        let root = match Config::find_workspace_root() {
            Some(root) => root,
            None => std::env::current_dir().context("Failed to read current directory")?,
        };

        Self::open(root)
    }

    /// Initializes a workspace at the given path
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let state_dir = root.join(STATE_DIR);

        fs::create_dir_all(&state_dir).with_context(|| {
            format!("Failed to create {} directory: {}", STATE_DIR, state_dir.display())
        })?;

        let config_path = state_dir.join("config.toml");
        if !config_path.exists() {
            let default_config = r#"# typings configuration

# Package manager used when a project gives no hint (npm, yarn or pnpm)
# bin = "npm"

# Install typings as devDependencies when a project gives no hint
# dev = false

# Never install typings for devDependencies
# skip_dev = false

[daemon]
enabled = true
debounce_ms = 500

# Pin a project to a manager, by path relative to this workspace
# [overrides."packages/web"]
# bin = "yarn"
# dev = true
"#;
            fs::write(&config_path, default_config)
                .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        }

        let gitignore_path = state_dir.join(".gitignore");
        if !gitignore_path.exists() {
            let gitignore = r#"# Daemon state
daemon.pid
daemon.log
daemon.log.*
"#;
            fs::write(&gitignore_path, gitignore).with_context(|| {
                format!("Failed to write .gitignore: {}", gitignore_path.display())
            })?;
        }

        Self::open(root)
    }

    /// Returns the workspace root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the .typings directory path
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    /// True if `typings init` has been run here
    pub fn is_initialized(&self) -> bool {
        self.state_dir().is_dir()
    }

    /// Returns the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the daemon PID file
    pub fn pid_file(&self) -> PidFile {
        PidFile::new(self.state_dir().join("daemon.pid"))
    }

    /// Returns the daemon log file path
    pub fn log_path(&self) -> PathBuf {
        self.state_dir().join("daemon.log")
    }

    /// Finds every project root below the workspace root, skipping
    /// excluded directories (see [`is_excluded_path`])
    pub fn discover_projects(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !(entry.file_type().is_dir() && is_excluded_dir(entry.file_name()))
            })
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file() && entry.file_name() == MANIFEST_FILE)
            .filter_map(|entry| entry.path().parent().map(Path::to_path_buf))
            .collect();

        roots.sort();
        roots
    }

    /// Returns a relative path from the workspace root
    pub fn relative_path(&self, path: &Path) -> Option<PathBuf> {
        path.strip_prefix(&self.root).ok().map(|p| p.to_path_buf())
    }
}

/// True for `node_modules`, the state directory and `.git`
pub fn is_excluded_dir(name: &OsStr) -> bool {
    EXCLUDED_DIRS.iter().any(|excluded| name == *excluded)
}

/// True if a path relative to the workspace root passes through an
/// excluded directory. Discovery and the watcher both go through this.
pub fn is_excluded_path(relative: &Path) -> bool {
    relative
        .components()
        .any(|component| is_excluded_dir(component.as_os_str()))
}

/// True if `path` lies inside a `node_modules` directory
pub fn is_inside_node_modules(path: &Path) -> bool {
    path.components()
        .any(|component| component.as_os_str() == NODE_MODULES)
}
