//! Manifest tracker
//!
//! Holds the last known dependency and engine maps of one project. Each
//! reload diffs the previous snapshot against the next one and publishes one
//! [`ChangeEvent`] per changed key to the tracker's subscribers.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

use super::manifest::{DependencyMap, Manifest};
use super::typings::typings_package_for;

/// The three dependency sections of a manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    Dependencies,
    DevDependencies,
    PeerDependencies,
}

impl DependencyKind {
    /// All kinds, in the order a reload visits them
    pub const ALL: [DependencyKind; 3] = [
        DependencyKind::Dependencies,
        DependencyKind::DevDependencies,
        DependencyKind::PeerDependencies,
    ];

    /// Only `devDependencies` changes are reported as dev
    pub fn is_dev(&self) -> bool {
        matches!(self, DependencyKind::DevDependencies)
    }
}

/// A single key that changed between two snapshots
///
/// `version: None` means the key was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Dependency {
        name: String,
        version: Option<String>,
        dev: bool,
    },
    Engine {
        name: String,
        version: Option<String>,
    },
}

impl ChangeEvent {
    /// The package or engine name this event is about
    pub fn name(&self) -> &str {
        match self {
            ChangeEvent::Dependency { name, .. } | ChangeEvent::Engine { name, .. } => name,
        }
    }
}

/// Keys whose presence or value differs between `old` and `new`, sorted.
///
/// Values are compared as plain strings; `^1.0.0` and `^1.0` are different.
pub fn shallow_diff(old: &DependencyMap, new: &DependencyMap) -> Vec<String> {
    let mut changed = BTreeSet::new();

    for (name, version) in old {
        if new.get(name) != Some(version) {
            changed.insert(name.clone());
        }
    }
    for name in new.keys() {
        if !old.contains_key(name) {
            changed.insert(name.clone());
        }
    }

    changed.into_iter().collect()
}

type Listener = Box<dyn FnMut(&ChangeEvent)>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// Handle returned by [`ManifestTracker::subscribe`]
///
/// Dropping the handle keeps the listener attached; call [`dispose`](Self::dispose)
/// to detach it. Must not be disposed from inside a listener.
#[must_use = "a subscription stays attached until disposed"]
pub struct Subscription {
    id: u64,
    listeners: Weak<RefCell<Listeners>>,
}

impl Subscription {
    /// Detaches the listener from its tracker
    pub fn dispose(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .borrow_mut()
                .entries
                .retain(|(id, _)| *id != self.id);
        }
    }
}

/// Dependency and engine snapshots for one project
#[derive(Default)]
pub struct ManifestTracker {
    dependencies: DependencyMap,
    dev_dependencies: DependencyMap,
    peer_dependencies: DependencyMap,
    engines: DependencyMap,
    listeners: Rc<RefCell<Listeners>>,
}

impl ManifestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener that receives every event in emission order
    pub fn subscribe(&self, listener: impl FnMut(&ChangeEvent) + 'static) -> Subscription {
        let mut listeners = self.listeners.borrow_mut();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.push((id, Box::new(listener)));

        Subscription {
            id,
            listeners: Rc::downgrade(&self.listeners),
        }
    }

    /// Number of attached listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().entries.len()
    }

    /// Replaces the snapshots with the given manifest and emits the changes.
    ///
    /// A `None` manifest (unreadable or malformed) leaves every snapshot
    /// untouched and emits nothing. Events are also returned, in emission
    /// order: dependency kinds first in [`DependencyKind::ALL`] order, then
    /// engines; keys sorted within each kind.
    pub fn reload(&mut self, manifest: Option<&Manifest>) -> Vec<ChangeEvent> {
        let Some(manifest) = manifest else {
            return Vec::new();
        };

        let mut events = Vec::new();

        for kind in DependencyKind::ALL {
            let next = manifest.dependency_map(kind).cloned().unwrap_or_default();
            for name in shallow_diff(self.map(kind), &next) {
                let version = next.get(&name).cloned();
                events.push(self.emit(ChangeEvent::Dependency {
                    name,
                    version,
                    dev: kind.is_dev(),
                }));
            }
            *self.map_mut(kind) = next;
        }

        let next = manifest.engines.clone().unwrap_or_default();
        for name in shallow_diff(&self.engines, &next) {
            let version = next.get(&name).cloned();
            events.push(self.emit(ChangeEvent::Engine { name, version }));
        }
        self.engines = next;

        events
    }

    fn emit(&self, event: ChangeEvent) -> ChangeEvent {
        for (_, listener) in self.listeners.borrow_mut().entries.iter_mut() {
            listener(&event);
        }
        event
    }

    /// Returns the snapshot for one dependency kind
    pub fn map(&self, kind: DependencyKind) -> &DependencyMap {
        match kind {
            DependencyKind::Dependencies => &self.dependencies,
            DependencyKind::DevDependencies => &self.dev_dependencies,
            DependencyKind::PeerDependencies => &self.peer_dependencies,
        }
    }

    fn map_mut(&mut self, kind: DependencyKind) -> &mut DependencyMap {
        match kind {
            DependencyKind::Dependencies => &mut self.dependencies,
            DependencyKind::DevDependencies => &mut self.dev_dependencies,
            DependencyKind::PeerDependencies => &mut self.peer_dependencies,
        }
    }

    pub fn dependencies(&self) -> &DependencyMap {
        &self.dependencies
    }

    pub fn dev_dependencies(&self) -> &DependencyMap {
        &self.dev_dependencies
    }

    pub fn peer_dependencies(&self) -> &DependencyMap {
        &self.peer_dependencies
    }

    pub fn engines(&self) -> &DependencyMap {
        &self.engines
    }

    /// Version range of a dependency, looked up in dependencies, then
    /// devDependencies, then peerDependencies
    pub fn dependency(&self, name: &str) -> Option<&str> {
        DependencyKind::ALL
            .iter()
            .find_map(|kind| self.map(*kind).get(name))
            .map(String::as_str)
    }

    /// Names declared in any dependency section
    pub fn declared_names(&self) -> BTreeSet<String> {
        DependencyKind::ALL
            .iter()
            .flat_map(|kind| self.map(*kind).keys().cloned())
            .collect()
    }

    /// True if the typings package for `name` is declared in dependencies or
    /// devDependencies
    pub fn has_typings_for(&self, name: &str) -> bool {
        let typings = typings_package_for(name);
        self.dependencies.contains_key(&typings) || self.dev_dependencies.contains_key(&typings)
    }
}
