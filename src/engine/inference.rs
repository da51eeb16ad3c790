//! Package manager inference
//!
//! Decides which manager governs a project, first from `engines` hints, then
//! from marker files in the project root. The selection is kept current by
//! feeding it marker and engine changes; a full rescan only happens when the
//! evidence behind the current selection disappears.

use std::path::{Path, PathBuf};

use crate::domain::{marker_manager, DependencyMap, ManagerKind, MARKER_FILES};

#[derive(Debug, Clone)]
pub struct ManagerInference {
    root: PathBuf,
    engines: DependencyMap,
    selection: Option<ManagerKind>,
}

impl ManagerInference {
    /// Creates an inference for the project at `root` and resolves it
    pub fn new(root: impl Into<PathBuf>, engines: &DependencyMap) -> Self {
        let mut inference = Self {
            root: root.into(),
            engines: engines.clone(),
            selection: None,
        };
        inference.resolve();
        inference
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Current selection; `None` means "use the configured default"
    pub fn selection(&self) -> Option<ManagerKind> {
        self.selection
    }

    /// Reruns the full resolution and returns the new selection
    pub fn resolve(&mut self) -> Option<ManagerKind> {
        self.selection = self.engine_hint().or_else(|| self.marker_hint());
        self.selection
    }

    fn engine_hint(&self) -> Option<ManagerKind> {
        ManagerKind::ALL
            .into_iter()
            .find(|kind| self.engines.contains_key(kind.as_str()))
    }

    fn marker_hint(&self) -> Option<ManagerKind> {
        MARKER_FILES
            .iter()
            .find(|(file, _)| self.root.join(file).is_file())
            .map(|(_, kind)| *kind)
    }

    /// A marker file appeared in the project root
    pub fn marker_created(&mut self, file_name: &str) {
        if let Some(kind) = marker_manager(file_name) {
            self.selection = Some(kind);
        }
    }

    /// A marker file disappeared from the project root
    pub fn marker_deleted(&mut self, file_name: &str) {
        if let Some(kind) = marker_manager(file_name) {
            if self.selection == Some(kind) {
                self.resolve();
            }
        }
    }

    /// An `engines` entry changed; `None` means it was removed
    pub fn engine_changed(&mut self, name: &str, version: Option<&str>) {
        match version {
            Some(version) => {
                self.engines.insert(name.to_string(), version.to_string());
            }
            None => {
                self.engines.remove(name);
            }
        }

        let Ok(kind) = name.parse::<ManagerKind>() else {
            return;
        };
        if version.is_some() {
            self.selection = Some(kind);
        } else if self.selection == Some(kind) {
            self.resolve();
        }
    }
}
