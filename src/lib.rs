//! typings - keeps `@types` packages in step with `package.json`
//!
//! A workspace daemon watches every `package.json` below its root. When a
//! project with a `tsconfig.json` gains a dependency, the matching `@types`
//! package is installed with the project's own package manager; when the
//! dependency goes away, so do its typings.

pub mod domain;
pub mod storage;
pub mod engine;
pub mod cli;

pub use domain::{ChangeEvent, ManagerKind, Manifest, ManifestTracker};
pub use engine::{InstallTask, ProjectRegistry, TaskQueue};
