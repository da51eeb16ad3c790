//! Project registry
//!
//! Owns every project found under the workspace root and wires each one to
//! its tracker, its manager inference and, while the project has a
//! `tsconfig.json`, its install queue. File events from the watcher are
//! routed here and turned into install and uninstall tasks.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use super::inference::ManagerInference;
use super::queue::{InstallTask, ManagerSource, ProjectHints, QueueSettings, TaskQueue};
use super::runner::CommandRunner;
use super::watcher::{FileChange, FileEvent, WatchedFile};
use crate::domain::{
    is_registry_range, is_typings_package, typings_package_for, ChangeEvent, DependencyKind,
    ManagerKind, ManifestTracker, Subscription,
};
use crate::storage::{
    is_inside_node_modules, package_ships_types, read_manifest, Config, DaemonLog, MANIFEST_FILE,
    NODE_MODULES, TSCONFIG_FILE,
};

struct Project {
    root: PathBuf,
    tracker: ManifestTracker,
    hints: Arc<ProjectHints>,
    queue: Option<TaskQueue>,
    subscriptions: Vec<Subscription>,
}

impl Project {
    fn dispose(mut self) {
        if let Some(queue) = self.queue.take() {
            queue.dispose();
        }
        for subscription in self.subscriptions.drain(..) {
            subscription.dispose();
        }
    }
}

/// Summary of one project, as shown by `typings check`
#[derive(Debug, Clone, Serialize)]
pub struct ProjectReport {
    pub root: PathBuf,
    pub active: bool,
    pub manager: ManagerKind,
    pub manager_source: ManagerSource,
    pub dev_default: Option<bool>,
    /// Typings packages that would be installed for existing dependencies
    pub missing: Vec<String>,
}

/// Every known project, keyed by root directory
pub struct ProjectRegistry {
    config: Config,
    runner: Arc<dyn CommandRunner>,
    log: DaemonLog,
    projects: BTreeMap<PathBuf, Project>,
}

impl ProjectRegistry {
    pub fn new(config: Config, runner: Arc<dyn CommandRunner>, log: DaemonLog) -> Self {
        Self {
            config,
            runner,
            log,
            projects: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn contains(&self, root: &Path) -> bool {
        self.projects.contains_key(root)
    }

    pub fn is_active(&self, root: &Path) -> bool {
        self.projects
            .get(root)
            .is_some_and(|project| project.queue.is_some())
    }

    /// Starts tracking the project at `root`.
    ///
    /// The initial manifest read only seeds the tracker; dependencies that
    /// already exist produce no tasks. Returns false if the root lies inside
    /// `node_modules`, has no manifest, or is already loaded.
    pub fn load_project(&mut self, root: &Path) -> bool {
        if is_inside_node_modules(root)
            || self.projects.contains_key(root)
            || !root.join(MANIFEST_FILE).is_file()
        {
            return false;
        }

        let mut tracker = ManifestTracker::new();
        tracker.reload(read_manifest(&root.join(MANIFEST_FILE)).as_ref());

        let inference = ManagerInference::new(root, tracker.engines());
        let hints = Arc::new(ProjectHints::new(inference));
        let subscriptions = vec![forward_hints(&tracker, &hints)];

        self.projects.insert(
            root.to_path_buf(),
            Project {
                root: root.to_path_buf(),
                tracker,
                hints,
                queue: None,
                subscriptions,
            },
        );
        self.log.info(format!("Loaded package: {}", root.display()));

        if root.join(TSCONFIG_FILE).is_file() {
            self.activate(root);
        }
        true
    }

    /// Stops tracking a project. A running install finishes; nothing else starts.
    pub fn remove_project(&mut self, root: &Path) -> bool {
        let Some(project) = self.projects.remove(root) else {
            return false;
        };

        project.dispose();
        self.log.info(format!("Removed package: {}", root.display()));
        true
    }

    /// Re-reads a project's manifest and enqueues the resulting tasks.
    ///
    /// Returns the tasks that were enqueued; nothing is enqueued for an
    /// inactive project.
    pub fn reload_project(&mut self, root: &Path) -> Vec<InstallTask> {
        let skip_dev = self.config.skip_dev();
        let Some(project) = self.projects.get_mut(root) else {
            return Vec::new();
        };

        let manifest = read_manifest(&root.join(MANIFEST_FILE));
        if manifest.is_none() {
            self.log
                .info(format!("Skipping unreadable manifest: {}", root.display()));
            return Vec::new();
        }

        let previous = project.tracker.declared_names();
        let events = project.tracker.reload(manifest.as_ref());

        let Some(queue) = &project.queue else {
            return Vec::new();
        };

        let tasks: Vec<InstallTask> = events
            .iter()
            .filter_map(|event| decide(event, &project.root, &project.tracker, &previous, skip_dev))
            .collect();

        for task in &tasks {
            queue.enqueue(task.clone());
        }
        tasks
    }

    /// Gives a project an install queue
    pub fn activate(&mut self, root: &Path) {
        let settings = self.settings_for(root);
        let Some(project) = self.projects.get_mut(root) else {
            return;
        };
        if project.queue.is_some() {
            return;
        }

        project
            .hints
            .set_dev_default(sniff_dev_default(&project.tracker));
        project.queue = Some(TaskQueue::new(
            root,
            Arc::clone(&project.hints),
            settings,
            Arc::clone(&self.runner),
            self.log.clone(),
        ));
        self.log
            .info(format!("Enabled auto-typings for package: {}", root.display()));
    }

    /// Disposes a project's install queue
    pub fn deactivate(&mut self, root: &Path) {
        let Some(queue) = self
            .projects
            .get_mut(root)
            .and_then(|project| project.queue.take())
        else {
            return;
        };

        queue.dispose();
        self.log
            .info(format!("Disabled auto-typings for package: {}", root.display()));
    }

    pub fn marker_created(&mut self, root: &Path, file_name: &str) {
        if let Some(project) = self.projects.get(root) {
            project
                .hints
                .update_inference(|inference| inference.marker_created(file_name));
        }
    }

    pub fn marker_deleted(&mut self, root: &Path, file_name: &str) {
        if let Some(project) = self.projects.get(root) {
            project
                .hints
                .update_inference(|inference| inference.marker_deleted(file_name));
        }
    }

    /// Routes one watcher event
    pub fn handle(&mut self, event: &FileEvent) {
        let root = event.project_root().to_path_buf();

        match (&event.file, event.change) {
            (WatchedFile::Manifest, FileChange::Removed) => {
                self.remove_project(&root);
            }
            (WatchedFile::Manifest, _) => {
                if self.contains(&root) {
                    self.reload_project(&root);
                } else {
                    self.load_project(&root);
                }
            }
            (WatchedFile::TsConfig, FileChange::Added) => self.activate(&root),
            (WatchedFile::TsConfig, FileChange::Removed) => self.deactivate(&root),
            (WatchedFile::TsConfig, FileChange::Changed) => {}
            (WatchedFile::Marker(file), FileChange::Added) => self.marker_created(&root, file),
            (WatchedFile::Marker(file), FileChange::Removed) => self.marker_deleted(&root, file),
            (WatchedFile::Marker(_), FileChange::Changed) => {}
        }
    }

    /// Disposes every project
    pub fn clear(&mut self) {
        let roots: Vec<PathBuf> = self.projects.keys().cloned().collect();
        for root in roots {
            self.remove_project(&root);
        }
    }

    /// Blocks until every install queue is idle
    pub fn wait_idle(&self) {
        for queue in self.projects.values().filter_map(|p| p.queue.as_ref()) {
            queue.wait_idle();
        }
    }

    /// Typings installs that existing dependencies of `root` call for
    pub fn missing_typings(&self, root: &Path) -> Vec<InstallTask> {
        let Some(project) = self.projects.get(root) else {
            return Vec::new();
        };
        let skip_dev = self.config.skip_dev();

        let mut seen = BTreeSet::new();
        let mut tasks = Vec::new();
        for kind in DependencyKind::ALL {
            for (name, version) in project.tracker.map(kind) {
                let dev = kind.is_dev();
                if !wants_typings(&project.root, &project.tracker, name, version, dev, skip_dev) {
                    continue;
                }
                let typings = typings_package_for(name);
                if seen.insert(typings.clone()) {
                    tasks.push(InstallTask::install(typings, "*", dev.then_some(true)));
                }
            }
        }
        tasks
    }

    /// Enqueues the missing typings of every active project and returns how
    /// many tasks were enqueued
    pub fn install_missing(&self) -> usize {
        let mut count = 0;
        for project in self.projects.values() {
            let Some(queue) = &project.queue else {
                continue;
            };
            for task in self.missing_typings(&project.root) {
                queue.enqueue(task);
                count += 1;
            }
        }
        count
    }

    pub fn report(&self, root: &Path) -> Option<ProjectReport> {
        let project = self.projects.get(root)?;
        let settings = self.settings_for(root);
        let (manager, manager_source) = settings.effective_manager(&project.hints);
        let dev_default = match project.queue {
            Some(_) => project.hints.dev_default(),
            None => sniff_dev_default(&project.tracker),
        };

        Some(ProjectReport {
            root: project.root.clone(),
            active: project.queue.is_some(),
            manager,
            manager_source,
            dev_default,
            missing: self
                .missing_typings(root)
                .into_iter()
                .map(|task| task.name)
                .collect(),
        })
    }

    pub fn reports(&self) -> Vec<ProjectReport> {
        self.projects
            .keys()
            .filter_map(|root| self.report(root))
            .collect()
    }

    fn settings_for(&self, root: &Path) -> QueueSettings {
        let project_override = self.config.project_override(root);
        QueueSettings {
            default_bin: self.config.bin(),
            default_dev: self.config.dev(),
            bin_override: project_override.bin,
            dev_override: project_override.dev,
        }
    }
}

impl Drop for ProjectRegistry {
    fn drop(&mut self) {
        for (_, project) in std::mem::take(&mut self.projects) {
            project.dispose();
        }
    }
}

/// Feeds engine changes to inference and lets the first typings change
/// settle an undetermined dev default
fn forward_hints(tracker: &ManifestTracker, hints: &Arc<ProjectHints>) -> Subscription {
    let hints = Arc::clone(hints);
    tracker.subscribe(move |event| match event {
        ChangeEvent::Engine { name, version } => {
            hints.update_inference(|inference| inference.engine_changed(name, version.as_deref()));
        }
        ChangeEvent::Dependency {
            name,
            version: Some(_),
            dev,
        } if is_typings_package(name) => hints.learn_dev_default(*dev),
        ChangeEvent::Dependency { .. } => {}
    })
}

/// Where a project keeps its typings: `false` if any sit in dependencies,
/// `true` if any sit in devDependencies, `None` if there are none yet
pub fn sniff_dev_default(tracker: &ManifestTracker) -> Option<bool> {
    let has_typings = |kind: DependencyKind| {
        tracker
            .map(kind)
            .keys()
            .any(|name| is_typings_package(name))
    };

    if has_typings(DependencyKind::Dependencies) {
        Some(false)
    } else if has_typings(DependencyKind::DevDependencies) {
        Some(true)
    } else {
        None
    }
}

fn wants_typings(
    project_root: &Path,
    tracker: &ManifestTracker,
    name: &str,
    version: &str,
    dev: bool,
    skip_dev: bool,
) -> bool {
    !is_typings_package(name)
        && !(dev && skip_dev)
        && is_registry_range(version)
        && !tracker.has_typings_for(name)
        && !package_ships_types(&project_root.join(NODE_MODULES).join(name))
}

/// The task, if any, one dependency event calls for.
///
/// `previous` holds the names declared before the reload that produced the
/// event; `tracker` already reflects the new manifest.
pub fn decide(
    event: &ChangeEvent,
    project_root: &Path,
    tracker: &ManifestTracker,
    previous: &BTreeSet<String>,
    skip_dev: bool,
) -> Option<InstallTask> {
    let ChangeEvent::Dependency { name, version, dev } = event else {
        return None;
    };
    if is_typings_package(name) {
        return None;
    }

    match version {
        Some(version) => {
            if previous.contains(name)
                || !wants_typings(project_root, tracker, name, version, *dev, skip_dev)
            {
                return None;
            }
            Some(InstallTask::install(
                typings_package_for(name),
                "*",
                dev.then_some(true),
            ))
        }
        None => {
            if tracker.dependency(name).is_some() || !tracker.has_typings_for(name) {
                return None;
            }
            Some(InstallTask::uninstall(typings_package_for(name)))
        }
    }
}
