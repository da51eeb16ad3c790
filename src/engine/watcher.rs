//! File watching
//!
//! [`Watcher`] delivers debounced batches of changed paths under the
//! workspace root. Debounced notifications carry no add/remove distinction,
//! so [`FileClassifier`] remembers which watched files exist and turns each
//! path into a typed [`FileEvent`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};

use crate::domain::{marker_manager, MARKER_FILES};
use crate::storage::{is_excluded_path, MANIFEST_FILE, TSCONFIG_FILE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChange {
    Added,
    Changed,
    Removed,
}

/// The kinds of files the engine reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchedFile {
    Manifest,
    TsConfig,
    /// A package manager marker, by file name
    Marker(String),
}

impl WatchedFile {
    fn from_file_name(name: &str) -> Option<Self> {
        if name == MANIFEST_FILE {
            Some(WatchedFile::Manifest)
        } else if name == TSCONFIG_FILE {
            Some(WatchedFile::TsConfig)
        } else {
            marker_manager(name).map(|_| WatchedFile::Marker(name.to_string()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub change: FileChange,
    pub file: WatchedFile,
    pub path: PathBuf,
}

impl FileEvent {
    /// Directory holding the file, i.e. the project it belongs to
    pub fn project_root(&self) -> &Path {
        self.path.parent().unwrap_or(&self.path)
    }
}

/// True for paths the engine never reacts to: anything outside `root` or
/// below an excluded directory
pub fn is_ignored_path(root: &Path, path: &Path) -> bool {
    match path.strip_prefix(root) {
        Ok(relative) => is_excluded_path(relative),
        Err(_) => true,
    }
}

/// Turns raw changed paths into [`FileEvent`]s
#[derive(Debug)]
pub struct FileClassifier {
    root: PathBuf,
    known: HashSet<PathBuf>,
}

impl FileClassifier {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            known: HashSet::new(),
        }
    }

    /// Records the watched files that already exist in a project root
    pub fn seed_project(&mut self, project_root: &Path) {
        let names = [MANIFEST_FILE, TSCONFIG_FILE]
            .into_iter()
            .chain(MARKER_FILES.iter().map(|(file, _)| *file));

        for name in names {
            let path = project_root.join(name);
            if path.is_file() {
                self.known.insert(path);
            }
        }
    }

    /// Number of files currently known to exist
    pub fn known_count(&self) -> usize {
        self.known.len()
    }

    /// Classifies one changed path.
    ///
    /// A vanished directory yields a `Removed` event for every known file
    /// below it, sorted by path.
    pub fn classify(&mut self, path: &Path) -> Vec<FileEvent> {
        if is_ignored_path(&self.root, path) {
            return Vec::new();
        }

        let exists = path.is_file();
        let known = self.known.contains(path);

        if !exists && !known {
            if path.exists() {
                return Vec::new();
            }
            return self.forget_under(path);
        }

        let Some(file) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(WatchedFile::from_file_name)
        else {
            return Vec::new();
        };

        let change = match (exists, known) {
            (true, false) => {
                self.known.insert(path.to_path_buf());
                FileChange::Added
            }
            (true, true) => FileChange::Changed,
            _ => {
                self.known.remove(path);
                FileChange::Removed
            }
        };

        vec![FileEvent {
            change,
            file,
            path: path.to_path_buf(),
        }]
    }

    fn forget_under(&mut self, dir: &Path) -> Vec<FileEvent> {
        let mut gone: Vec<PathBuf> = self
            .known
            .iter()
            .filter(|known| known.starts_with(dir))
            .cloned()
            .collect();
        gone.sort();

        gone.into_iter()
            .filter_map(|path| {
                self.known.remove(&path);
                let file = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .and_then(WatchedFile::from_file_name)?;
                Some(FileEvent {
                    change: FileChange::Removed,
                    file,
                    path,
                })
            })
            .collect()
    }
}

/// Recursive, debounced watch over a workspace root.
/// Dropping the watcher stops it.
pub struct Watcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    events: Receiver<DebounceEventResult>,
}

impl Watcher {
    pub fn start(root: &Path, debounce: Duration) -> Result<Self> {
        let (tx, rx) = mpsc::channel();

        let mut debouncer =
            new_debouncer(debounce, tx).context("Failed to create file watcher")?;
        debouncer
            .watcher()
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", root.display()))?;

        Ok(Self {
            _debouncer: debouncer,
            events: rx,
        })
    }

    /// Waits up to `timeout` for the next batch. `Disconnected` means the
    /// watcher has shut down.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<DebounceEventResult, RecvTimeoutError> {
        self.events.recv_timeout(timeout)
    }
}
