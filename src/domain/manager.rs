//! Package managers and their command-line conventions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Unknown package manager: {0} (expected npm, yarn or pnpm)")]
pub struct UnknownManager(pub String);

/// A supported package manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagerKind {
    Npm,
    Yarn,
    Pnpm,
}

impl ManagerKind {
    /// All managers, in the order engine hints are checked
    pub const ALL: [ManagerKind; 3] = [ManagerKind::Npm, ManagerKind::Yarn, ManagerKind::Pnpm];

    pub fn as_str(&self) -> &'static str {
        match self {
            ManagerKind::Npm => "npm",
            ManagerKind::Yarn => "yarn",
            ManagerKind::Pnpm => "pnpm",
        }
    }

    /// Executable to invoke
    pub fn binary(&self) -> &'static str {
        self.as_str()
    }

    /// Argument builder for this manager. pnpm accepts npm's commands.
    pub fn adapter(&self) -> &'static dyn PackageManager {
        match self {
            ManagerKind::Npm | ManagerKind::Pnpm => &NpmCli,
            ManagerKind::Yarn => &YarnCli,
        }
    }
}

impl fmt::Display for ManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ManagerKind {
    type Err = UnknownManager;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ManagerKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownManager(s.to_string()))
    }
}

/// Builds the arguments for one manager's install and uninstall commands
pub trait PackageManager: Sync {
    fn install_args(&self, name: &str, version: &str, dev: bool) -> Vec<String>;

    fn uninstall_args(&self, name: &str) -> Vec<String>;
}

/// `npm install` / `npm uninstall`
pub struct NpmCli;

impl PackageManager for NpmCli {
    fn install_args(&self, name: &str, version: &str, dev: bool) -> Vec<String> {
        let mut args = vec!["install".to_string(), format!("{}@{}", name, version)];
        if dev {
            args.push("-D".to_string());
        }
        args
    }

    fn uninstall_args(&self, name: &str) -> Vec<String> {
        vec!["uninstall".to_string(), name.to_string()]
    }
}

/// `yarn add` / `yarn remove`
pub struct YarnCli;

impl PackageManager for YarnCli {
    fn install_args(&self, name: &str, version: &str, dev: bool) -> Vec<String> {
        let mut args = vec!["add".to_string(), format!("{}@{}", name, version)];
        if dev {
            args.push("-D".to_string());
        }
        args
    }

    fn uninstall_args(&self, name: &str) -> Vec<String> {
        vec!["remove".to_string(), name.to_string()]
    }
}

/// Files whose presence in a project root identifies its manager.
/// Checked in this order.
pub const MARKER_FILES: [(&str, ManagerKind); 7] = [
    (".npmrc", ManagerKind::Npm),
    ("package-lock.json", ManagerKind::Npm),
    ("npm-shrinkwrap.json", ManagerKind::Npm),
    (".yarnrc", ManagerKind::Yarn),
    ("yarn.lock", ManagerKind::Yarn),
    (".pnpmrc", ManagerKind::Pnpm),
    ("shrinkwrap.yaml", ManagerKind::Pnpm),
];

/// Manager identified by a marker file name
pub fn marker_manager(file_name: &str) -> Option<ManagerKind> {
    MARKER_FILES
        .iter()
        .find(|(marker, _)| *marker == file_name)
        .map(|(_, kind)| *kind)
}
