use std::path::PathBuf;

use clap::Parser;

/// Install grml live ISOs onto USB devices.
///
/// Takes one or more ISO files (or live image directories such as
/// `/live/image`) followed by the target partition or directory.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "grml2usb",
    about = "Install a grml ISO to a USB device to be able to boot from it",
    disable_version_flag = true
)]
pub struct Cli {
    /// ISO files or live image directories, then the target device
    #[arg(
        value_name = "ISO... TARGET",
        num_args = 2..,
        required_unless_present = "version"
    )]
    pub paths: Vec<PathBuf>,

    /// Use specified bootoptions as default
    #[arg(long, value_name = "OPTIONS")]
    pub bootoptions: Option<String>,

    /// Do not copy files but just install a bootloader
    #[arg(long, conflicts_with = "copy_only")]
    pub bootloader_only: bool,

    /// Copy files only but do not install bootloader
    #[arg(long)]
    pub copy_only: bool,

    /// Avoid executing commands
    #[arg(long)]
    pub dry_run: bool,

    /// Format specified partition with FAT16
    #[arg(long)]
    pub fat16: bool,

    /// Force any actions requiring manual interaction
    #[arg(long)]
    pub force: bool,

    /// Install grub bootloader instead of syslinux
    #[arg(long)]
    pub grub: bool,

    /// Install specified initrd instead of the default (not supported yet)
    #[arg(long, value_name = "PATH")]
    pub initrd: Option<PathBuf>,

    /// Install specified kernel instead of the default (not supported yet)
    #[arg(long, value_name = "PATH")]
    pub kernel: Option<PathBuf>,

    /// Install specified squashfs file instead of the default (not supported yet)
    #[arg(long, value_name = "PATH")]
    pub squashfs: Option<PathBuf>,

    /// Lilo executable to be used for installing MBR
    #[arg(long, value_name = "PATH")]
    pub lilo: Option<PathBuf>,

    /// Install master boot record (MBR) on the device
    #[arg(long)]
    pub mbr: bool,

    /// Do not output anything but just errors on console
    #[arg(long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Enable verbose mode
    #[arg(long)]
    pub verbose: bool,

    /// Remove grml ISO files from specified device (not supported yet)
    #[arg(long)]
    pub uninstall: bool,

    /// Display version and exit
    #[arg(short = 'v', long)]
    pub version: bool,
}

impl Cli {
    /// Image sources: every path but the last.
    #[must_use]
    pub fn sources(&self) -> &[PathBuf] {
        self.paths
            .split_last()
            .map(|(_, sources)| sources)
            .unwrap_or_default()
    }

    /// Target: the last path.
    #[must_use]
    pub fn target(&self) -> Option<&PathBuf> {
        self.paths.last()
    }

    /// Flags that are accepted but not implemented.
    #[must_use]
    pub fn unsupported_flags(&self) -> Vec<String> {
        [
            ("--initrd", self.initrd.is_some()),
            ("--kernel", self.kernel.is_some()),
            ("--squashfs", self.squashfs.is_some()),
            ("--uninstall", self.uninstall),
        ]
        .into_iter()
        .filter(|(_, given)| *given)
        .map(|(flag, _)| flag.to_string())
        .collect()
    }
}
