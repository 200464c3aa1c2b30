//! Run configuration: the validated options of one invocation and the site
//! settings they are resolved against.
pub mod settings;

use std::path::PathBuf;

use crate::error::UsageError;

pub use settings::Settings;

/// What to put on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeployMode {
    /// Copy the live payload and install the boot loader.
    #[default]
    Both,
    /// Copy the live payload only (`--copy-only`).
    CopyOnly,
    /// Boot loader assets and configuration only (`--bootloader-only`).
    BootloaderOnly,
}

impl DeployMode {
    /// Whether kernel, initrd and squashfs are copied.
    #[must_use]
    pub const fn copies_payload(self) -> bool {
        matches!(self, Self::Both | Self::CopyOnly)
    }

    /// Whether boot loader assets, configuration and binary are installed.
    #[must_use]
    pub const fn installs_bootloader(self) -> bool {
        matches!(self, Self::Both | Self::BootloaderOnly)
    }
}

/// Boot loader written to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootloaderKind {
    /// `syslinux -d boot/syslinux <partition>`.
    #[default]
    Syslinux,
    /// `grub-install` (`--grub`).
    Grub,
}

/// Fully resolved options of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOptions {
    /// ISO files or live-image directories, in install order.
    pub sources: Vec<PathBuf>,
    /// Partition or directory receiving the images.
    pub target: PathBuf,
    /// Extra kernel options for every live entry.
    pub boot_options: String,
    /// Copy and/or boot loader.
    pub mode: DeployMode,
    /// Log mutating actions instead of performing them.
    pub dry_run: bool,
    /// Format the target with FAT16 first.
    pub fat16: bool,
    /// Skip every confirmation prompt.
    pub force: bool,
    /// Boot loader to install.
    pub bootloader: BootloaderKind,
    /// Install a master boot record on the target's disk.
    pub mbr: bool,
    /// Boot manager binary for the MBR.
    pub lilo: PathBuf,
    /// MBR image written after the boot manager ran.
    pub donor_mbr: PathBuf,
    /// Directory with bundled assets.
    pub data_dir: PathBuf,
    /// Live mount table.
    pub mount_table: PathBuf,
    /// sysfs mount point.
    pub sysfs_root: PathBuf,
    /// Recognised but unimplemented flags that were given.
    pub unsupported: Vec<String>,
}

impl InstallOptions {
    /// Options for installing `sources` to `target` with defaults from
    /// `settings`.
    #[must_use]
    pub fn new(sources: Vec<PathBuf>, target: PathBuf, settings: &Settings) -> Self {
        Self {
            sources,
            target,
            boot_options: settings.boot_options(),
            mode: DeployMode::default(),
            dry_run: false,
            fat16: false,
            force: false,
            bootloader: BootloaderKind::default(),
            mbr: false,
            lilo: settings.lilo(),
            donor_mbr: settings.donor_mbr(),
            data_dir: settings.data_dir(),
            mount_table: settings.mount_table(),
            sysfs_root: settings.sysfs_root(),
            unsupported: Vec::new(),
        }
    }

    /// Reject invocations that cannot be carried out, before any mutation.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::Unsupported`] for unimplemented flags and
    /// [`UsageError::InvalidUsage`] for missing sources.
    pub fn validate(&self) -> Result<(), UsageError> {
        if let Some(flag) = self.unsupported.first() {
            return Err(UsageError::Unsupported(flag.clone()));
        }
        if self.sources.is_empty() {
            return Err(UsageError::InvalidUsage(
                "expected at least one ISO or live image and a target".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether the target path starts like the mount points older releases
    /// expected instead of a device.
    #[must_use]
    pub fn has_legacy_target(&self) -> bool {
        let target = self.target.to_string_lossy();
        target.starts_with("/mnt/external") || target.starts_with("/mnt/usb")
    }
}
