//! Target classification: device naming, removable check, filesystem probe.
use std::fs;
use std::path::{Path, PathBuf};

use nix::unistd::{AccessFlags, access};

use crate::error::DeviceError;
use crate::exec::Runner;

/// Filesystem types reported by `blkid` that count as FAT.
const FAT_TYPES: &[&str] = &["vfat", "msdos", "fat", "fat12", "fat16", "fat32"];

/// Extract the base device name from a `/dev/<name>` path.
///
/// Names made of letters followed by a partition index (`sdb4`, `hda1`)
/// lose the index. Names with digits inside (`nvme0n1p1`, `mmcblk0p1`) are
/// returned unchanged; use [`DeviceClassifier::disk_name`] to resolve their
/// parent disk through sysfs.
///
/// # Errors
///
/// Returns [`DeviceError::InvalidPath`] if `path` is not `/dev/<name>`.
pub fn extract_device_name(path: &str) -> Result<String, DeviceError> {
    let invalid = || DeviceError::InvalidPath(path.to_string());
    let name = path.strip_prefix("/dev/").ok_or_else(invalid)?;
    if name.is_empty() || name.contains('/') {
        return Err(invalid());
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(invalid());
    }

    let stem = name.trim_end_matches(|c: char| c.is_ascii_digit());
    if !stem.is_empty() && stem.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(stem.to_string())
    } else {
        Ok(name.to_string())
    }
}

/// What the positional target argument refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetKind {
    /// An existing directory, used in place and never mounted.
    Directory,
    /// A block device partition.
    Device {
        /// Whole disk holding the partition (e.g. `sdb`).
        disk: String,
        /// Whether the kernel flags the disk as removable.
        removable: bool,
    },
}

/// Classified installation target, derived once per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallTarget {
    /// Raw path from the command line.
    pub path: PathBuf,
    /// Directory or device.
    pub kind: TargetKind,
    /// Whether the current user may write to the path.
    pub writable: bool,
}

impl InstallTarget {
    /// Whether the target is a directory rather than a device.
    #[must_use]
    pub const fn is_directory(&self) -> bool {
        matches!(self.kind, TargetKind::Directory)
    }

    /// `/dev/<disk>` for device targets.
    #[must_use]
    pub fn disk_path(&self) -> Option<PathBuf> {
        match &self.kind {
            TargetKind::Directory => None,
            TargetKind::Device { disk, .. } => Some(Path::new("/dev").join(disk)),
        }
    }
}

/// Inspects devices through sysfs and `blkid`.
#[derive(Debug, Clone)]
pub struct DeviceClassifier {
    runner: Runner,
    sysfs_root: PathBuf,
}

impl DeviceClassifier {
    /// Create a classifier reading device metadata below `sysfs_root`.
    #[must_use]
    pub const fn new(runner: Runner, sysfs_root: PathBuf) -> Self {
        Self { runner, sysfs_root }
    }

    /// Classify the target argument.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::InvalidPath`] if the path is neither an existing
    /// directory nor a `/dev/<name>` path.
    pub fn classify(&self, path: &Path) -> Result<InstallTarget, DeviceError> {
        if path.is_dir() {
            return Ok(InstallTarget {
                path: path.to_path_buf(),
                kind: TargetKind::Directory,
                writable: is_writable(path),
            });
        }
        let disk = self.disk_name(path)?;
        let removable = self.is_removable(&disk);
        Ok(InstallTarget {
            path: path.to_path_buf(),
            kind: TargetKind::Device { disk, removable },
            writable: is_writable(path),
        })
    }

    /// Resolve the whole-disk name for a device path.
    ///
    /// Partitions known to sysfs resolve to their parent disk; otherwise the
    /// result of [`extract_device_name`] is used.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::InvalidPath`] for malformed paths.
    pub fn disk_name(&self, path: &Path) -> Result<String, DeviceError> {
        let raw = path.to_string_lossy();
        let base = extract_device_name(&raw)?;
        let full = raw.trim_start_matches("/dev/");
        let node = self.sysfs_root.join("class/block").join(full);
        if node.join("partition").is_file()
            && let Ok(resolved) = fs::canonicalize(&node)
            && let Some(parent) = resolved
                .parent()
                .and_then(Path::file_name)
                .and_then(|n| n.to_str())
        {
            return Ok(parent.to_string());
        }
        Ok(base)
    }

    /// Whether `device` (a path or bare disk name) looks like removable media.
    ///
    /// Reads `<sysfs>/block/<disk>/removable`; a missing attribute counts as
    /// fixed.
    #[must_use]
    pub fn is_removable_usb(&self, device: &Path) -> bool {
        self.disk_name(device)
            .is_ok_and(|disk| self.is_removable(&disk))
    }

    fn is_removable(&self, disk: &str) -> bool {
        let attr = self.sysfs_root.join("block").join(disk).join("removable");
        fs::read_to_string(attr).is_ok_and(|v| v.trim() == "1")
    }

    /// Filesystem type reported by `blkid`, `None` if it found none.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::ProbeUnavailable`] if `blkid` cannot be run.
    pub fn probe_filesystem(&self, partition: &Path) -> Result<Option<String>, DeviceError> {
        let unavailable = |reason: String| DeviceError::ProbeUnavailable {
            device: partition.to_path_buf(),
            reason,
        };
        if !self.runner.which("blkid") {
            return Err(unavailable("blkid not found".to_string()));
        }
        let part = partition.to_string_lossy();
        let out = self
            .runner
            .query_unchecked("blkid", &["-o", "value", "-s", "TYPE", &*part])
            .map_err(|e| unavailable(e.to_string()))?;
        let fstype = out.stdout.trim();
        if !out.success || fstype.is_empty() {
            return Ok(None);
        }
        Ok(Some(fstype.to_string()))
    }

    /// Whether `partition` holds a FAT-family filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::ProbeUnavailable`] if `blkid` cannot be run.
    pub fn has_fat_filesystem(&self, partition: &Path) -> Result<bool, DeviceError> {
        Ok(self
            .probe_filesystem(partition)?
            .is_some_and(|t| FAT_TYPES.contains(&t.to_ascii_lowercase().as_str())))
    }

    /// Fail with [`DeviceError::NotFat`] unless `partition` holds FAT.
    ///
    /// # Errors
    ///
    /// Returns an error if the probe fails or the filesystem is not FAT.
    pub fn require_fat(&self, partition: &Path) -> Result<(), DeviceError> {
        match self.probe_filesystem(partition)? {
            Some(t) if FAT_TYPES.contains(&t.to_ascii_lowercase().as_str()) => Ok(()),
            found => Err(DeviceError::NotFat {
                device: partition.to_path_buf(),
                found: found.unwrap_or_default(),
            }),
        }
    }
}

/// Whether the current user may write to `path`.
#[must_use]
pub fn is_writable(path: &Path) -> bool {
    access(path, AccessFlags::W_OK).is_ok()
}
