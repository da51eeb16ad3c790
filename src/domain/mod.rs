//! Domain models for typings
//!
//! Manifest snapshots, change events and package-manager conventions,
//! without any I/O concerns.

mod manifest;
mod tracker;
mod manager;
mod typings;

pub use manifest::{DependencyMap, Manifest};
pub use tracker::{shallow_diff, ChangeEvent, DependencyKind, ManifestTracker, Subscription};
pub use manager::{marker_manager, ManagerKind, NpmCli, PackageManager, UnknownManager, YarnCli, MARKER_FILES};
pub use typings::{is_registry_range, is_typings_package, typings_package_for, TYPES_SCOPE};
