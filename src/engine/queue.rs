//! Install queue
//!
//! Each active project owns one [`TaskQueue`]: a FIFO of install/uninstall
//! tasks drained by at most one worker thread at a time. Enqueueing never
//! blocks and never reports errors; outcomes only show up in the log.
//!
//! ```text
//!  enqueue ──► pending ──► idle? ──yes──► spawn worker ─┐
//!                            │                          │
//!                            no (worker picks it up)    ▼
//!                                             pop ► run ► pop ► ... ► idle
//! ```

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use serde::Serialize;

use super::inference::ManagerInference;
use super::runner::CommandRunner;
use crate::domain::ManagerKind;
use crate::storage::DaemonLog;

/// A package to install, or to uninstall when `version` is `None`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallTask {
    pub name: String,
    pub version: Option<String>,
    /// Explicit dev flag; `None` leaves the choice to the project defaults
    pub dev: Option<bool>,
}

impl InstallTask {
    pub fn install(name: impl Into<String>, version: impl Into<String>, dev: Option<bool>) -> Self {
        Self {
            name: name.into(),
            version: Some(version.into()),
            dev,
        }
    }

    pub fn uninstall(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            dev: None,
        }
    }

    pub fn is_install(&self) -> bool {
        self.version.is_some()
    }

    /// `name@version` for installs, the bare name for uninstalls
    pub fn spec(&self) -> String {
        match &self.version {
            Some(version) => format!("{}@{}", self.name, version),
            None => self.name.clone(),
        }
    }
}

/// How a task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    /// The registry has no such package or version
    NotFound,
    Failed(String),
}

/// Classifies a failed run of `task`.
///
/// Only npm's `404 Not Found: <name>@<version>` wording is recognized, and
/// only when it names exactly the package being installed.
pub fn classify_failure(task: &InstallTask, message: &str) -> TaskOutcome {
    match npm_not_found(message) {
        Some(spec) if task.is_install() && spec == task.spec() => TaskOutcome::NotFound,
        _ => TaskOutcome::Failed(message.to_string()),
    }
}

fn npm_not_found(message: &str) -> Option<&str> {
    const SIGNATURE: &str = "404 Not Found: ";
    let start = message.find(SIGNATURE)? + SIGNATURE.len();
    message[start..].split_whitespace().next()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-project hints shared between the registry and the queue worker
#[derive(Debug)]
pub struct ProjectHints {
    inference: Mutex<ManagerInference>,
    dev_default: Mutex<Option<bool>>,
}

impl ProjectHints {
    pub fn new(inference: ManagerInference) -> Self {
        Self {
            inference: Mutex::new(inference),
            dev_default: Mutex::new(None),
        }
    }

    /// Inferred manager, if any
    pub fn manager(&self) -> Option<ManagerKind> {
        lock(&self.inference).selection()
    }

    /// Runs `update` against the project's manager inference
    pub fn update_inference<R>(&self, update: impl FnOnce(&mut ManagerInference) -> R) -> R {
        update(&mut lock(&self.inference))
    }

    /// Inferred dev flag for typings, if any
    pub fn dev_default(&self) -> Option<bool> {
        *lock(&self.dev_default)
    }

    pub fn set_dev_default(&self, dev: Option<bool>) {
        *lock(&self.dev_default) = dev;
    }

    /// Records `dev` unless a default is already known
    pub fn learn_dev_default(&self, dev: bool) {
        lock(&self.dev_default).get_or_insert(dev);
    }
}

/// Where the effective manager came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerSource {
    Override,
    Inferred,
    Default,
}

impl ManagerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManagerSource::Override => "override",
            ManagerSource::Inferred => "inferred",
            ManagerSource::Default => "default",
        }
    }
}

/// Configured values a queue falls back on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    pub default_bin: ManagerKind,
    pub default_dev: bool,
    pub bin_override: Option<ManagerKind>,
    pub dev_override: Option<bool>,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            default_bin: ManagerKind::Npm,
            default_dev: false,
            bin_override: None,
            dev_override: None,
        }
    }
}

impl QueueSettings {
    /// Project override, then inference, then the configured default
    pub fn effective_manager(&self, hints: &ProjectHints) -> (ManagerKind, ManagerSource) {
        if let Some(kind) = self.bin_override {
            return (kind, ManagerSource::Override);
        }
        match hints.manager() {
            Some(kind) => (kind, ManagerSource::Inferred),
            None => (self.default_bin, ManagerSource::Default),
        }
    }

    /// Task flag, then project override, then the sniffed project default,
    /// then the configured default
    pub fn effective_dev(&self, task: &InstallTask, hints: &ProjectHints) -> bool {
        task.dev
            .or(self.dev_override)
            .or_else(|| hints.dev_default())
            .unwrap_or(self.default_dev)
    }
}

struct Executor {
    root: PathBuf,
    hints: Arc<ProjectHints>,
    settings: QueueSettings,
    runner: Arc<dyn CommandRunner>,
    log: DaemonLog,
}

impl Executor {
    fn execute(&self, task: &InstallTask) -> TaskOutcome {
        let (manager, _) = self.settings.effective_manager(&self.hints);
        let adapter = manager.adapter();

        let args = match task.version.as_deref() {
            Some(version) => {
                let dev = self.settings.effective_dev(task, &self.hints);
                self.log.info(format!("Installing: {}", task.name));
                adapter.install_args(&task.name, version, dev)
            }
            None => {
                self.log.info(format!("Removing: {}", task.name));
                adapter.uninstall_args(&task.name)
            }
        };

        self.log.info(format!(
            "Running {} {} in {}",
            manager.binary(),
            args.join(" "),
            self.root.display()
        ));

        let outcome = match self.runner.run(manager.binary(), &args, &self.root) {
            Ok(()) => TaskOutcome::Completed,
            Err(e) => classify_failure(task, &e.to_string()),
        };

        match &outcome {
            TaskOutcome::Completed => self.log.info(format!("Done: {}", task.spec())),
            TaskOutcome::NotFound => self.log.info(format!("Package not found: {}", task.spec())),
            TaskOutcome::Failed(message) => {
                self.log.error(format!("Failed: {}: {}", task.spec(), message))
            }
        }

        outcome
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<InstallTask>,
    /// A worker is running; set before it is spawned, cleared by it
    draining: bool,
    disposed: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    idle: Condvar,
    executor: Executor,
}

impl Shared {
    fn drain(&self) {
        loop {
            let task = {
                let mut state = lock(&self.state);
                let next = if state.disposed {
                    None
                } else {
                    state.pending.pop_front()
                };
                match next {
                    Some(task) => task,
                    None => {
                        state.draining = false;
                        self.idle.notify_all();
                        return;
                    }
                }
            };

            self.executor.execute(&task);
        }
    }
}

/// Ordered, single-flight install queue for one project
pub struct TaskQueue {
    shared: Arc<Shared>,
}

impl TaskQueue {
    pub fn new(
        root: impl Into<PathBuf>,
        hints: Arc<ProjectHints>,
        settings: QueueSettings,
        runner: Arc<dyn CommandRunner>,
        log: DaemonLog,
    ) -> Self {
        let executor = Executor {
            root: root.into(),
            hints,
            settings,
            runner,
            log,
        };

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                idle: Condvar::new(),
                executor,
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.shared.executor.root
    }

    pub fn install(&self, name: &str, version: &str, dev: Option<bool>) {
        self.enqueue(InstallTask::install(name, version, dev));
    }

    pub fn uninstall(&self, name: &str) {
        self.enqueue(InstallTask::uninstall(name));
    }

    /// Appends a task and starts a worker if none is running.
    /// Does nothing once the queue is disposed.
    pub fn enqueue(&self, task: InstallTask) {
        let mut state = lock(&self.shared.state);
        if state.disposed {
            return;
        }

        state.pending.push_back(task);
        if state.draining {
            return;
        }
        state.draining = true;
        drop(state);

        self.start_worker();
    }

    fn start_worker(&self) {
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("typings-queue".to_string())
            .spawn(move || shared.drain());

        if let Err(e) = spawned {
            let mut state = lock(&self.shared.state);
            state.draining = false;
            self.shared.idle.notify_all();
            drop(state);

            self.shared.executor.log.error(format!(
                "Failed to start install worker for {}: {}",
                self.root().display(),
                e
            ));
        }
    }

    /// Number of tasks waiting to start
    pub fn pending(&self) -> usize {
        lock(&self.shared.state).pending.len()
    }

    pub fn is_idle(&self) -> bool {
        !lock(&self.shared.state).draining
    }

    /// Blocks until no worker is running
    pub fn wait_idle(&self) {
        let mut state = lock(&self.shared.state);
        while state.draining {
            state = self
                .shared
                .idle
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Drops pending tasks and ignores future ones. A task that is already
    /// running finishes.
    pub fn dispose(&self) {
        let mut state = lock(&self.shared.state);
        state.disposed = true;
        state.pending.clear();
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.shared.state).disposed
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DependencyMap;
    use crate::engine::runner::ExecError;
    use std::fs;
    use std::sync::mpsc;
    use tempfile::TempDir;

    /// Records calls; the first call can be held until released
    #[derive(Default)]
    struct ScriptedRunner {
        calls: Mutex<Vec<Vec<String>>>,
        started: Mutex<Option<mpsc::Sender<()>>>,
        gate: Mutex<Option<mpsc::Receiver<()>>>,
        failures: Vec<(&'static str, &'static str)>,
    }

    impl ScriptedRunner {
        fn gated() -> (Self, mpsc::Receiver<()>, mpsc::Sender<()>) {
            let (started_tx, started_rx) = mpsc::channel();
            let (release_tx, release_rx) = mpsc::channel();
            let runner = Self {
                started: Mutex::new(Some(started_tx)),
                gate: Mutex::new(Some(release_rx)),
                ..Default::default()
            };
            (runner, started_rx, release_tx)
        }

        fn failing(failures: Vec<(&'static str, &'static str)>) -> Self {
            Self {
                failures,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, program: &str, args: &[String], _cwd: &Path) -> Result<(), ExecError> {
            let mut call = vec![program.to_string()];
            call.extend(args.iter().cloned());
            self.calls.lock().unwrap().push(call);

            if let Some(started) = self.started.lock().unwrap().take() {
                started.send(()).unwrap();
            }
            let gate = self.gate.lock().unwrap().take();
            if let Some(gate) = gate {
                gate.recv().unwrap();
            }

            for (needle, output) in &self.failures {
                if args.iter().any(|arg| arg.contains(needle)) {
                    return Err(ExecError::Exit {
                        program: program.to_string(),
                        status: "exit status: 1".to_string(),
                        output: output.to_string(),
                    });
                }
            }
            Ok(())
        }
    }

    fn call(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    fn hints(root: &Path) -> Arc<ProjectHints> {
        Arc::new(ProjectHints::new(ManagerInference::new(root, &DependencyMap::new())))
    }

    fn queue(dir: &TempDir, runner: Arc<ScriptedRunner>, log: DaemonLog) -> TaskQueue {
        TaskQueue::new(
            dir.path(),
            hints(dir.path()),
            QueueSettings::default(),
            runner,
            log,
        )
    }

    #[test]
    fn classify_not_found() {
        let task = InstallTask::install("@types/left-pad", "*", None);
        assert_eq!(
            classify_failure(&task, "npm ERR! 404 Not Found: @types/left-pad@*"),
            TaskOutcome::NotFound
        );
    }

    #[test]
    fn classify_other_package_not_found_as_failure() {
        let task = InstallTask::install("@types/left-pad", "*", None);
        assert!(matches!(
            classify_failure(&task, "404 Not Found: @types/right-pad@*"),
            TaskOutcome::Failed(_)
        ));
        assert!(matches!(
            classify_failure(&task, "404 Not Found: @types/left-pad@1.0.0"),
            TaskOutcome::Failed(_)
        ));
        assert!(matches!(
            classify_failure(&task, "EACCES: permission denied"),
            TaskOutcome::Failed(_)
        ));
    }

    #[test]
    fn uninstall_is_never_not_found() {
        let task = InstallTask::uninstall("@types/left-pad");
        assert!(matches!(
            classify_failure(&task, "404 Not Found: @types/left-pad"),
            TaskOutcome::Failed(_)
        ));
    }

    #[test]
    fn tasks_run_in_enqueue_order_while_busy() {
        let dir = TempDir::new().unwrap();
        let (runner, started, release) = ScriptedRunner::gated();
        let runner = Arc::new(runner);
        let queue = queue(&dir, Arc::clone(&runner), DaemonLog::discard());

        queue.install("@types/lodash", "*", None);
        started.recv().unwrap();

        // The install is still running
        queue.uninstall("@types/lodash");
        assert_eq!(queue.pending(), 1);
        assert!(!queue.is_idle());

        release.send(()).unwrap();
        queue.wait_idle();

        assert_eq!(
            runner.calls(),
            vec![
                call(&["npm", "install", "@types/lodash@*"]),
                call(&["npm", "uninstall", "@types/lodash"]),
            ]
        );
        assert!(queue.is_idle());
    }

    #[test]
    fn queue_restarts_after_idle() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::default());
        let queue = queue(&dir, Arc::clone(&runner), DaemonLog::discard());

        queue.install("@types/a", "*", None);
        queue.wait_idle();
        queue.install("@types/b", "*", Some(true));
        queue.wait_idle();

        assert_eq!(
            runner.calls(),
            vec![
                call(&["npm", "install", "@types/a@*"]),
                call(&["npm", "install", "@types/b@*", "-D"]),
            ]
        );
    }

    #[test]
    fn not_found_does_not_block_queue() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::failing(vec![(
            "left-pad",
            "npm ERR! 404 Not Found: @types/left-pad@*",
        )]));
        let log = DaemonLog::in_memory();
        let queue = queue(&dir, Arc::clone(&runner), log.clone());

        queue.install("@types/left-pad", "*", None);
        queue.install("@types/lodash", "*", None);
        queue.wait_idle();

        assert_eq!(runner.calls().len(), 2);
        let lines = log.lines();
        assert!(lines.contains(&"INFO Package not found: @types/left-pad@*".to_string()));
        assert!(lines.contains(&"INFO Done: @types/lodash@*".to_string()));
        assert!(!lines.iter().any(|line| line.starts_with("ERROR")));
    }

    #[test]
    fn failure_is_logged_and_queue_continues() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::failing(vec![("broken", "EINTEGRITY")]));
        let log = DaemonLog::in_memory();
        let queue = queue(&dir, Arc::clone(&runner), log.clone());

        queue.install("@types/broken", "*", None);
        queue.uninstall("@types/old");
        queue.wait_idle();

        assert_eq!(runner.calls().len(), 2);
        let lines = log.lines();
        assert!(lines
            .iter()
            .any(|line| line.starts_with("ERROR Failed: @types/broken@*") && line.contains("EINTEGRITY")));
        assert!(lines.contains(&"INFO Done: @types/old".to_string()));
    }

    #[test]
    fn dispose_lets_running_task_finish_and_drops_the_rest() {
        let dir = TempDir::new().unwrap();
        let (runner, started, release) = ScriptedRunner::gated();
        let runner = Arc::new(runner);
        let queue = queue(&dir, Arc::clone(&runner), DaemonLog::discard());

        queue.install("@types/a", "*", None);
        started.recv().unwrap();
        queue.install("@types/b", "*", None);
        queue.install("@types/c", "*", None);

        queue.dispose();
        assert_eq!(queue.pending(), 0);

        release.send(()).unwrap();
        queue.wait_idle();
        assert_eq!(runner.calls(), vec![call(&["npm", "install", "@types/a@*"])]);

        queue.install("@types/d", "*", None);
        queue.wait_idle();
        assert_eq!(runner.calls().len(), 1);
        assert!(queue.is_disposed());
    }

    #[test]
    fn inferred_manager_is_used() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("yarn.lock"), "").unwrap();
        let runner = Arc::new(ScriptedRunner::default());
        let queue = queue(&dir, Arc::clone(&runner), DaemonLog::discard());

        queue.install("@types/a", "*", None);
        queue.wait_idle();
        assert_eq!(runner.calls(), vec![call(&["yarn", "add", "@types/a@*"])]);
    }

    #[test]
    fn manager_resolution_order() {
        let dir = TempDir::new().unwrap();
        let hints = hints(dir.path());
        let mut settings = QueueSettings {
            default_bin: ManagerKind::Pnpm,
            ..Default::default()
        };

        assert_eq!(
            settings.effective_manager(&hints),
            (ManagerKind::Pnpm, ManagerSource::Default)
        );

        hints.update_inference(|inference| inference.marker_created("yarn.lock"));
        assert_eq!(
            settings.effective_manager(&hints),
            (ManagerKind::Yarn, ManagerSource::Inferred)
        );

        settings.bin_override = Some(ManagerKind::Npm);
        assert_eq!(
            settings.effective_manager(&hints),
            (ManagerKind::Npm, ManagerSource::Override)
        );
    }

    #[test]
    fn dev_resolution_order() {
        let dir = TempDir::new().unwrap();
        let hints = hints(dir.path());
        let mut settings = QueueSettings {
            default_dev: true,
            ..Default::default()
        };
        let unflagged = InstallTask::install("@types/a", "*", None);

        assert!(settings.effective_dev(&unflagged, &hints));

        hints.set_dev_default(Some(false));
        assert!(!settings.effective_dev(&unflagged, &hints));

        settings.dev_override = Some(true);
        assert!(settings.effective_dev(&unflagged, &hints));

        let flagged = InstallTask::install("@types/a", "*", Some(false));
        assert!(!settings.effective_dev(&flagged, &hints));
    }

    #[test]
    fn learned_dev_default_is_sticky() {
        let dir = TempDir::new().unwrap();
        let hints = hints(dir.path());

        hints.learn_dev_default(true);
        hints.learn_dev_default(false);
        assert_eq!(hints.dev_default(), Some(true));
    }
}
