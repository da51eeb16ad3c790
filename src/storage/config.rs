//! Configuration handling for typings
//!
//! Configuration is stored in `.typings/config.toml` (workspace) and
//! `~/.config/typings/config.toml` (global). Workspace values win over
//! global ones, which win over the built-in defaults.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ManagerKind;

/// Directory holding workspace configuration and daemon state
pub const STATE_DIR: &str = ".typings";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Configuration for the background daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Enable daemon functionality
    pub enabled: bool,

    /// Debounce delay in milliseconds before reacting to file changes
    pub debounce_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 500,
        }
    }
}

/// Settings that pin one project regardless of inference
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectOverride {
    /// Package manager to always use
    pub bin: Option<ManagerKind>,

    /// Install typings as devDependencies (true) or dependencies (false)
    pub dev: Option<bool>,
}

/// Workspace-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Fallback package manager when none can be inferred
    pub bin: Option<ManagerKind>,

    /// Install typings as devDependencies when a project gives no hint
    pub dev: Option<bool>,

    /// Never install typings for devDependencies
    pub skip_dev: Option<bool>,

    /// Daemon settings
    pub daemon: DaemonConfig,

    /// Per-project overrides, keyed by path relative to the workspace root
    /// (`"."` for the root itself)
    pub overrides: BTreeMap<String, ProjectOverride>,
}

/// Global user configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub bin: Option<ManagerKind>,
    pub dev: Option<bool>,
    pub skip_dev: Option<bool>,
}

/// Combined configuration (global + workspace)
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub workspace: WorkspaceConfig,
    pub global: GlobalConfig,
    pub workspace_root: Option<PathBuf>,
}

impl Config {
    /// Loads configuration for a specific workspace
    pub fn for_workspace(workspace_root: &Path) -> Result<Self> {
        let global = Self::load_global()?;
        let workspace = Self::load_workspace_config(workspace_root)?;

        Ok(Self {
            workspace,
            global,
            workspace_root: Some(workspace_root.to_path_buf()),
        })
    }

    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "typings", "typings-cli")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Loads global configuration
    fn load_global() -> Result<GlobalConfig> {
        let config_dir = match Self::global_config_dir() {
            Some(dir) => dir,
            None => return Ok(GlobalConfig::default()),
        };

        let config_path = config_dir.join("config.toml");
        if !config_path.exists() {
            return Ok(GlobalConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read global config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse global config")
    }

    /// Loads workspace configuration from a specific root
    fn load_workspace_config(workspace_root: &Path) -> Result<WorkspaceConfig> {
        let config_path = workspace_root.join(STATE_DIR).join("config.toml");

        if !config_path.exists() {
            return Ok(WorkspaceConfig::default());
        }

        let content = fs::read_to_string(&config_path).with_context(|| {
            format!("Failed to read workspace config: {}", config_path.display())
        })?;

        let config: WorkspaceConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse workspace config")?;

        config.validate()?;
        Ok(config)
    }

    /// Finds the workspace root by looking for a `.typings/` directory
    pub fn find_workspace_root() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;

        loop {
            if current.join(STATE_DIR).is_dir() {
                return Some(current);
            }

            if !current.pop() {
                return None;
            }
        }
    }

    /// Default package manager
    pub fn bin(&self) -> ManagerKind {
        self.workspace
            .bin
            .or(self.global.bin)
            .unwrap_or(ManagerKind::Npm)
    }

    /// Whether typings go to devDependencies by default
    pub fn dev(&self) -> bool {
        self.workspace.dev.or(self.global.dev).unwrap_or(false)
    }

    /// Whether dev dependencies are left without typings
    pub fn skip_dev(&self) -> bool {
        self.workspace
            .skip_dev
            .or(self.global.skip_dev)
            .unwrap_or(false)
    }

    /// Returns the override for the project at `project_root`, if any
    pub fn project_override(&self, project_root: &Path) -> ProjectOverride {
        let Some(workspace_root) = self.workspace_root.as_deref() else {
            return ProjectOverride::default();
        };
        let Ok(relative) = project_root.strip_prefix(workspace_root) else {
            return ProjectOverride::default();
        };

        let key = override_key(relative);
        self.workspace
            .overrides
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }

    /// Saves the workspace configuration
    pub fn save_workspace(&self) -> Result<()> {
        let root = self
            .workspace_root
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("No workspace root to save configuration to"))?;
        let config_path = root.join(STATE_DIR).join("config.toml");

        let content = toml::to_string_pretty(&self.workspace)
            .context("Failed to serialize workspace config")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write workspace config: {}", config_path.display()))
    }
}

impl WorkspaceConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.daemon.debounce_ms == 0 {
            return Err(ConfigError::Invalid(
                "daemon.debounce_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Override key for a path relative to the workspace root
fn override_key(relative: &Path) -> String {
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();

    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}
