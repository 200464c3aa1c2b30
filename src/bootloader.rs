//! Boot sector and master boot record installation.
use std::fs::{self, OpenOptions};
use std::io::{Read as _, Write as _};
use std::path::Path;

use nix::unistd::{AccessFlags, access};

use crate::config::BootloaderKind;
use crate::device::is_writable;
use crate::error::{DeviceError, ExecError, InstallError, UsageError};
use crate::exec::Runner;

/// Size of the boot code area in front of the partition table.
pub const MBR_CODE_SIZE: usize = 440;

/// Directory on the target holding the syslinux files.
const SYSLINUX_DIR: &str = "boot/syslinux";

/// Runs the boot loader and boot manager tools.
#[derive(Debug, Clone)]
pub struct BootloaderInstaller {
    runner: Runner,
}

impl BootloaderInstaller {
    /// Create an installer using `runner` for every tool invocation.
    #[must_use]
    pub const fn new(runner: Runner) -> Self {
        Self { runner }
    }

    /// Install the boot loader selected by `kind`.
    ///
    /// Syslinux is written to the unmounted `partition`. GRUB needs the
    /// target filesystem mounted at `mounted_root` and is written to `disk`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::ExecutionFailed`] if the tool fails, or
    /// [`UsageError::InvalidUsage`] if GRUB is requested without a mounted
    /// root.
    pub fn install(
        &self,
        kind: BootloaderKind,
        partition: &Path,
        disk: &Path,
        mounted_root: Option<&Path>,
    ) -> Result<(), InstallError> {
        match kind {
            BootloaderKind::Syslinux => {
                self.runner.log().info("Installing syslinux as bootloader");
                let part = partition.to_string_lossy();
                self.runner.apply("syslinux", &["-d", SYSLINUX_DIR, &*part])?;
            }
            BootloaderKind::Grub => {
                let root = mounted_root.ok_or_else(|| {
                    UsageError::InvalidUsage("grub needs the target mounted".to_string())
                })?;
                self.runner.log().info("Installing grub as bootloader");
                let root_arg = format!("--root-directory={}", root.display());
                let disk = disk.to_string_lossy();
                self.runner
                    .apply("grub-install", &["--no-floppy", &root_arg, &*disk])?;
            }
        }
        Ok(())
    }

    /// Install a master boot record on `disk`.
    ///
    /// `lilo` writes a partition-table aware MBR and marks partition 1
    /// active. Its boot code is then replaced with the first
    /// [`MBR_CODE_SIZE`] bytes of `donor`. Failure of that last step is only
    /// logged.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NotWritable`] before running anything if `disk`
    /// is not writable, [`ExecError::ToolMissing`] if `lilo` is not
    /// executable, or [`ExecError::ExecutionFailed`] if a lilo step fails.
    pub fn install_mbr(&self, disk: &Path, lilo: &Path, donor: &Path) -> Result<(), InstallError> {
        let log = self.runner.log();
        if !is_writable(disk) {
            return Err(DeviceError::NotWritable(disk.to_path_buf()).into());
        }
        if !is_executable(lilo) {
            return Err(ExecError::ToolMissing(lilo.display().to_string()).into());
        }

        log.info("Installing MBR");
        let lilo_bin = lilo.to_string_lossy();
        let dev = disk.to_string_lossy();
        self.runner
            .apply(&lilo_bin, &["-S", "/dev/null", "-M", &*dev, "ext"])?;
        self.runner
            .apply(&lilo_bin, &["-S", "/dev/null", "-A", &*dev, "1"])?;

        if !donor.is_file() {
            log.warn(&format!(
                "{} can not be read, keeping the boot manager's MBR",
                donor.display()
            ));
            return Ok(());
        }
        if self.runner.dry_run() {
            log.dry_run(&format!(
                "would copy {} to the boot code of {}",
                donor.display(),
                disk.display()
            ));
            return Ok(());
        }
        log.debug(&format!("writing {} to {}", donor.display(), disk.display()));
        if let Err(e) = write_boot_code(donor, disk) {
            log.warn(&format!("error copying MBR to {}: {e}", disk.display()));
        }
        Ok(())
    }
}

/// Whether `path` is a file the current user may execute.
fn is_executable(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.is_file()) && access(path, AccessFlags::X_OK).is_ok()
}

/// Overwrite the boot code area of `disk` with the start of `donor`,
/// leaving the partition table intact.
fn write_boot_code(donor: &Path, disk: &Path) -> std::io::Result<()> {
    let mut code = Vec::with_capacity(MBR_CODE_SIZE);
    fs::File::open(donor)?
        .take(MBR_CODE_SIZE as u64)
        .read_to_end(&mut code)?;
    let mut out = OpenOptions::new().write(true).open(disk)?;
    out.write_all(&code)?;
    out.sync_all()
}
