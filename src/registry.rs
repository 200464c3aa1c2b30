//! Bookkeeping of mounts and temporary paths held by the current process.
//!
//! The registry is an explicit object shared (via [`Arc`](std::sync::Arc))
//! between the orchestrator and the interrupt handler. Entries are added only
//! after the corresponding acquisition succeeded and removed only after the
//! release succeeded, so the interrupt handler always sees what is actually
//! held.
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Kind of resource tracked by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A mount point this process mounted.
    Mount,
    /// A temporary path this process created.
    TempPath,
}

#[derive(Debug, Default)]
struct Held {
    mounts: BTreeSet<PathBuf>,
    temp_paths: BTreeSet<PathBuf>,
}

impl Held {
    fn set_mut(&mut self, kind: ResourceKind) -> &mut BTreeSet<PathBuf> {
        match kind {
            ResourceKind::Mount => &mut self.mounts,
            ResourceKind::TempPath => &mut self.temp_paths,
        }
    }

    fn set(&self, kind: ResourceKind) -> &BTreeSet<PathBuf> {
        match kind {
            ResourceKind::Mount => &self.mounts,
            ResourceKind::TempPath => &self.temp_paths,
        }
    }
}

/// Process-wide record of held mounts and temporary paths.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    held: Mutex<Held>,
}

impl ResourceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `path` is now held. Returns `false` if it already was.
    pub fn register(&self, kind: ResourceKind, path: &Path) -> bool {
        self.held
            .lock()
            .is_ok_and(|mut held| held.set_mut(kind).insert(path.to_path_buf()))
    }

    /// Forget `path`. Returns `false` if it was not registered.
    pub fn unregister(&self, kind: ResourceKind, path: &Path) -> bool {
        self.held
            .lock()
            .is_ok_and(|mut held| held.set_mut(kind).remove(path))
    }

    /// Whether `path` is currently registered.
    #[must_use]
    pub fn contains(&self, kind: ResourceKind, path: &Path) -> bool {
        self.held
            .lock()
            .is_ok_and(|held| held.set(kind).contains(path))
    }

    /// Snapshot of registered paths of `kind`.
    ///
    /// Mounts are returned deepest first so nested mounts are released
    /// before their parents.
    #[must_use]
    pub fn list(&self, kind: ResourceKind) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .held
            .lock()
            .map_or_else(|_| Vec::new(), |held| held.set(kind).iter().cloned().collect());
        paths.reverse();
        paths
    }

    /// Whether nothing is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.held
            .lock()
            .is_ok_and(|held| held.mounts.is_empty() && held.temp_paths.is_empty())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn register_then_unregister() {
        let reg = ResourceRegistry::new();
        assert!(reg.register(ResourceKind::Mount, Path::new("/tmp/a")));
        assert!(reg.contains(ResourceKind::Mount, Path::new("/tmp/a")));
        assert!(reg.unregister(ResourceKind::Mount, Path::new("/tmp/a")));
        assert!(reg.is_empty());
    }

    #[test]
    fn double_register_reports_false() {
        let reg = ResourceRegistry::new();
        assert!(reg.register(ResourceKind::TempPath, Path::new("/tmp/a")));
        assert!(!reg.register(ResourceKind::TempPath, Path::new("/tmp/a")));
        assert_eq!(reg.list(ResourceKind::TempPath).len(), 1);
    }

    #[test]
    fn unregister_unknown_reports_false() {
        let reg = ResourceRegistry::new();
        assert!(!reg.unregister(ResourceKind::Mount, Path::new("/nowhere")));
    }

    #[test]
    fn kinds_are_tracked_separately() {
        let reg = ResourceRegistry::new();
        reg.register(ResourceKind::Mount, Path::new("/tmp/m"));
        assert!(!reg.contains(ResourceKind::TempPath, Path::new("/tmp/m")));
        assert!(reg.list(ResourceKind::TempPath).is_empty());
    }

    #[test]
    fn mounts_listed_deepest_first() {
        let reg = ResourceRegistry::new();
        reg.register(ResourceKind::Mount, Path::new("/tmp/x"));
        reg.register(ResourceKind::Mount, Path::new("/tmp/x/inner"));
        let list = reg.list(ResourceKind::Mount);
        assert_eq!(list[0], PathBuf::from("/tmp/x/inner"));
        assert_eq!(list[1], PathBuf::from("/tmp/x"));
    }
}
