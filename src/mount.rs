//! Mounting of images and target partitions with scoped release.
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::MountError;
use crate::exec::Runner;
use crate::registry::{ResourceKind, ResourceRegistry};

/// Whether a mount must happen even in dry-run mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountMode {
    /// Suppressed and logged in dry-run mode.
    Apply,
    /// Always performed; used for read-only image inspection.
    Inspect,
}

/// Mounts sources onto directories and records them in the registry.
#[derive(Debug, Clone)]
pub struct MountManager {
    runner: Runner,
    registry: Arc<ResourceRegistry>,
    mount_table: PathBuf,
}

impl MountManager {
    /// Create a manager consulting `mount_table` (normally `/proc/mounts`).
    #[must_use]
    pub const fn new(runner: Runner, registry: Arc<ResourceRegistry>, mount_table: PathBuf) -> Self {
        Self {
            runner,
            registry,
            mount_table,
        }
    }

    /// Registry shared with the interrupt handler.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    /// Mount `source` on `target` and return a guard that unmounts on drop.
    ///
    /// The target is registered only after `mount` succeeded. In dry-run
    /// mode an [`MountMode::Apply`] mount is only logged and the returned
    /// guard is inert.
    ///
    /// # Errors
    ///
    /// Returns [`MountError::Mount`] if the mount tool fails.
    pub fn mount(
        &self,
        source: &Path,
        target: &Path,
        options: &[&str],
        mode: MountMode,
    ) -> Result<MountGuard<'_>, MountError> {
        let source_str = source.to_string_lossy();
        let target_str = target.to_string_lossy();
        let mut args: Vec<&str> = options.to_vec();
        args.push(&*source_str);
        args.push(&*target_str);

        let result = match mode {
            MountMode::Apply => self.runner.apply("mount", &args),
            MountMode::Inspect => self.runner.apply_always("mount", &args),
        };
        result.map_err(|e| MountError::Mount {
            device: source.to_path_buf(),
            target: target.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mounted = mode == MountMode::Inspect || !self.runner.dry_run();
        if mounted {
            self.registry.register(ResourceKind::Mount, target);
            self.runner.log().debug(&format!(
                "mounted {} on {}",
                source.display(),
                target.display()
            ));
        }
        Ok(MountGuard {
            manager: self,
            target: target.to_path_buf(),
            active: mounted,
        })
    }

    /// Unmount `target` if it is present in the live mount table.
    ///
    /// Unmounting a path that is not mounted is a successful no-op. The
    /// registry entry is dropped once the path is no longer mounted.
    ///
    /// # Errors
    ///
    /// Returns [`MountError::Unmount`] if the unmount tool fails.
    pub fn unmount(&self, target: &Path) -> Result<(), MountError> {
        if !self.is_mounted(target) {
            self.runner
                .log()
                .debug(&format!("{} is not mounted, nothing to do", target.display()));
            self.registry.unregister(ResourceKind::Mount, target);
            return Ok(());
        }

        let target_str = target.to_string_lossy();
        let result = if self.registry.contains(ResourceKind::Mount, target) {
            self.runner.apply_always("umount", &[&*target_str])
        } else {
            self.runner.apply("umount", &[&*target_str])
        };
        result.map_err(|e| MountError::Unmount {
            target: target.to_path_buf(),
            reason: e.to_string(),
        })?;
        self.registry.unregister(ResourceKind::Mount, target);
        Ok(())
    }

    /// Whether `target` appears as a mount point in the mount table.
    ///
    /// An unreadable mount table is treated as "mounted" so that the unmount
    /// is attempted rather than silently skipped.
    #[must_use]
    pub fn is_mounted(&self, target: &Path) -> bool {
        let Ok(table) = fs::read_to_string(&self.mount_table) else {
            self.runner.log().warn(&format!(
                "cannot read mount table {}",
                self.mount_table.display()
            ));
            return true;
        };
        let canonical = fs::canonicalize(target).ok();
        mount_points(&table).any(|point| {
            point.as_path() == target || canonical.as_deref() == Some(point.as_path())
        })
    }

    /// Best-effort release of everything still held: flush writes, unmount
    /// every registered mount and remove every registered temporary path.
    ///
    /// Errors are logged and ignored so one stuck mount does not keep the
    /// others alive.
    pub fn release_all(&self) {
        self.runner.sync();
        for target in self.registry.list(ResourceKind::Mount) {
            if let Err(e) = self.unmount(&target) {
                self.runner.log().warn(&e.to_string());
                self.registry.unregister(ResourceKind::Mount, &target);
            }
        }
        for path in self.registry.list(ResourceKind::TempPath) {
            if let Err(e) = fs::remove_dir(&path)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                self.runner
                    .log()
                    .warn(&format!("cannot remove {}: {e}", path.display()));
            }
            self.registry.unregister(ResourceKind::TempPath, &path);
        }
    }
}

/// Parse the mount-point column of a `/proc/mounts`-style table.
fn mount_points(table: &str) -> impl Iterator<Item = PathBuf> + '_ {
    table
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(|field| PathBuf::from(unescape_octal(field)))
}

/// Decode the `\040`-style escapes the kernel uses for whitespace.
fn unescape_octal(field: &str) -> String {
    let mut out = Vec::with_capacity(field.len());
    let mut rest = field.as_bytes();
    while let Some((&first, tail)) = rest.split_first() {
        if first == b'\\'
            && let Some((digits, after)) = tail.split_first_chunk::<3>()
            && digits.iter().all(|b| (b'0'..=b'7').contains(b))
            && let Ok(byte) = u8::try_from(
                digits
                    .iter()
                    .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0')),
            )
        {
            out.push(byte);
            rest = after;
            continue;
        }
        out.push(first);
        rest = tail;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Unmounts its target when dropped.
#[derive(Debug)]
#[must_use = "dropping the guard unmounts immediately"]
pub struct MountGuard<'a> {
    manager: &'a MountManager,
    target: PathBuf,
    active: bool,
}

impl MountGuard<'_> {
    /// Mount point covered by this guard.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.target
    }

    /// Whether a mount actually took place (false for dry-run mounts).
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Unmount now, surfacing the error instead of logging it.
    ///
    /// # Errors
    ///
    /// Returns [`MountError::Unmount`] if the unmount tool fails.
    pub fn release(mut self) -> Result<(), MountError> {
        self.active = false;
        self.manager.unmount(&self.target)
    }
}

impl Drop for MountGuard<'_> {
    fn drop(&mut self) {
        if self.active
            && let Err(e) = self.manager.unmount(&self.target)
        {
            self.manager.runner.log().warn(&e.to_string());
        }
    }
}

/// Temporary mount-point directory, removed (not recursively) on drop.
#[derive(Debug)]
pub struct TempMountPoint {
    path: PathBuf,
    registry: Arc<ResourceRegistry>,
}

impl TempMountPoint {
    /// Create a fresh directory below the system temp dir.
    ///
    /// # Errors
    ///
    /// Returns [`MountError::Io`] if the directory cannot be created.
    pub fn create(registry: &Arc<ResourceRegistry>) -> Result<Self, MountError> {
        let dir = tempfile::Builder::new()
            .prefix("grml2usb")
            .tempdir()
            .map_err(|source| MountError::Io {
                path: std::env::temp_dir(),
                source,
            })?;
        // Never remove_dir_all a path that might still have a device on it.
        let path = dir.keep();
        registry.register(ResourceKind::TempPath, &path);
        Ok(Self {
            path,
            registry: Arc::clone(registry),
        })
    }

    /// Directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempMountPoint {
    fn drop(&mut self) {
        if fs::remove_dir(&self.path).is_ok() || !self.path.exists() {
            self.registry.unregister(ResourceKind::TempPath, &self.path);
        }
    }
}
