//! Site settings loaded from an optional TOML file.
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// Environment variable overriding the settings file location.
pub const CONFIG_ENV: &str = "GRML2USB_CONFIG";

/// Settings file used when [`CONFIG_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/grml2usb/grml2usb.toml";

const DEFAULT_DATA_DIR: &str = "/usr/share/grml2usb";
const DEFAULT_DONOR_MBR: &str = "/usr/lib/syslinux/mbr.bin";
const DEFAULT_MOUNT_TABLE: &str = "/proc/mounts";
const DEFAULT_SYSFS_ROOT: &str = "/sys";

/// Site-wide defaults. Every field is optional; command line flags win.
///
/// ```toml
/// data_dir = "/usr/share/grml2usb"
/// lilo = "/usr/share/grml2usb/lilo/lilo.static"
/// donor_mbr = "/usr/lib/syslinux/mbr.bin"
/// boot_options = "lang=de"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Directory with bundled assets (`grub/`, `lilo/`).
    pub data_dir: Option<PathBuf>,
    /// Boot manager binary used for `--mbr`.
    pub lilo: Option<PathBuf>,
    /// MBR image written over the boot manager's boot code.
    pub donor_mbr: Option<PathBuf>,
    /// Kernel options used when `--bootoptions` is absent.
    pub boot_options: Option<String>,
    /// Live mount table.
    pub mount_table: Option<PathBuf>,
    /// sysfs mount point.
    pub sysfs_root: Option<PathBuf>,
}

impl Settings {
    /// Settings file location: `$GRML2USB_CONFIG` or the system default.
    #[must_use]
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
    }

    /// Load settings from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Directory with bundled assets.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }

    /// Boot manager binary, defaulting to the bundled static lilo.
    #[must_use]
    pub fn lilo(&self) -> PathBuf {
        self.lilo
            .clone()
            .unwrap_or_else(|| self.data_dir().join("lilo/lilo.static"))
    }

    /// Donor MBR image.
    #[must_use]
    pub fn donor_mbr(&self) -> PathBuf {
        self.donor_mbr
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DONOR_MBR))
    }

    /// Default kernel options.
    #[must_use]
    pub fn boot_options(&self) -> String {
        self.boot_options.clone().unwrap_or_default()
    }

    /// Live mount table.
    #[must_use]
    pub fn mount_table(&self) -> PathBuf {
        self.mount_table
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MOUNT_TABLE))
    }

    /// sysfs mount point.
    #[must_use]
    pub fn sysfs_root(&self) -> PathBuf {
        self.sysfs_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SYSFS_ROOT))
    }
}
