//! # Engine
//!
//! Turns file changes into package manager invocations.
//!
//! ```text
//! Watcher ─► FileClassifier ─► ProjectRegistry ─► ManifestTracker (diff)
//!                                    │                   │
//!                                    │            ChangeEvents
//!                                    ▼                   ▼
//!                            ManagerInference ◄── decide() ─► TaskQueue ─► CommandRunner
//! ```
//!
//! ## Threads
//!
//! The registry, trackers and watcher live on the caller's thread. Each
//! active project's [`TaskQueue`] drains on its own worker thread, at most
//! one at a time per project. Workers share only the queue state and the
//! project's [`ProjectHints`] with the caller.

mod inference;
mod queue;
mod registry;
mod runner;
mod watcher;

pub use inference::ManagerInference;
pub use queue::{
    classify_failure, InstallTask, ManagerSource, ProjectHints, QueueSettings, TaskOutcome,
    TaskQueue,
};
pub use registry::{decide, sniff_dev_default, ProjectRegistry, ProjectReport};
pub use runner::{CommandRunner, ExecError, SystemRunner};
pub use watcher::{is_ignored_path, FileChange, FileClassifier, FileEvent, WatchedFile, Watcher};
