//! Installation sequence: pre-flight checks, one pass per image, then the
//! MBR and boot loader for the whole target.
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::bootconfig::ConfigParams;
use crate::bootloader::BootloaderInstaller;
use crate::config::{BootloaderKind, InstallOptions};
use crate::deploy::FileDeployer;
use crate::device::{DeviceClassifier, InstallTarget, TargetKind};
use crate::error::{ExecError, InstallError, UsageError};
use crate::exec::Runner;
use crate::flavour::{Flavour, identify_flavour};
use crate::logging::StepStatus;
use crate::mount::{MountManager, MountMode, TempMountPoint};
use crate::prompt::{Prompt, confirm_or_abort};
use crate::registry::ResourceRegistry;

/// ISO images are only ever read.
const ISO_MOUNT_OPTIONS: &[&str] = &["-o", "loop,ro", "-t", "iso9660"];

/// Result of a step that ran without error.
enum Outcome {
    Done,
    Skipped(String),
}

/// What a completed run installed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Flavours deployed, in source order.
    pub installed: Vec<Flavour>,
    /// Sources whose installation failed.
    pub failed: Vec<PathBuf>,
}

/// Drives one invocation from validation to boot loader installation.
pub struct Installer {
    options: InstallOptions,
    runner: Runner,
    prompt: Box<dyn Prompt>,
    mounts: MountManager,
    classifier: DeviceClassifier,
    deployer: FileDeployer,
    bootloader: BootloaderInstaller,
    timestamp: i64,
}

impl fmt::Debug for Installer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Installer")
            .field("options", &self.options)
            .field("runner", &self.runner)
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

impl Installer {
    /// Build an installer for `options`.
    ///
    /// Mounts and temporary directories are recorded in `registry`, which the
    /// caller may share with an interrupt handler.
    #[must_use]
    pub fn new(
        options: InstallOptions,
        runner: Runner,
        prompt: Box<dyn Prompt>,
        registry: Arc<ResourceRegistry>,
    ) -> Self {
        Self {
            mounts: MountManager::new(runner.clone(), registry, options.mount_table.clone()),
            classifier: DeviceClassifier::new(runner.clone(), options.sysfs_root.clone()),
            deployer: FileDeployer::new(runner.clone(), options.data_dir.clone()),
            bootloader: BootloaderInstaller::new(runner.clone()),
            timestamp: chrono::Utc::now().timestamp(),
            options,
            runner,
            prompt,
        }
    }

    /// Use `timestamp` as the run identifier instead of the current time.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Run the whole installation.
    ///
    /// Validation, tool availability and confirmations are settled before
    /// anything is written. A failing image is recorded and the remaining
    /// images are still installed. Everything left in the registry is
    /// released before returning.
    ///
    /// # Errors
    ///
    /// Returns an error for fatal pre-flight failures and for failures of
    /// the formatting, MBR or boot loader steps.
    pub fn run(&self) -> Result<RunReport, InstallError> {
        let result = self.run_steps();
        if !self.mounts.registry().is_empty() {
            self.mounts.release_all();
        }
        result
    }

    fn run_steps(&self) -> Result<RunReport, InstallError> {
        let log = self.runner.log();
        self.options.validate()?;
        if self.options.dry_run {
            log.info("Running in simulate mode as requested via option dry-run.");
        }
        self.confirm_legacy_target()?;
        self.check_sources()?;

        let target = self.classifier.classify(&self.options.target)?;
        if self.options.fat16 && target.is_directory() {
            return Err(UsageError::InvalidUsage(
                "--fat16 needs a device, not a directory".to_string(),
            )
            .into());
        }
        self.check_tools(&target)?;
        self.prepare_device(&target)?;

        let mut report = RunReport::default();
        for source in &self.options.sources {
            let name = format!("Install {}", source.display());
            log.stage(&name);
            match self.install_image(source, &target) {
                Ok(flavour) => {
                    log.record_step(&name, self.done_status(), Some(flavour.as_str()));
                    report.installed.push(flavour);
                }
                Err(e) => {
                    log.error(&format!("{name}: {e}"));
                    log.record_step(&name, StepStatus::Failed, Some(&e.to_string()));
                    report.failed.push(source.clone());
                }
            }
        }

        self.execute("Install MBR", || self.install_mbr(&target))?;
        self.execute("Install bootloader", || {
            self.install_bootloader(&target, !report.installed.is_empty())
        })?;

        if report.failed.is_empty() {
            log.info("Finished execution of grml2usb. Have fun with your grml system.");
        }
        Ok(report)
    }

    /// Run one named step and record its outcome for the summary.
    fn execute(
        &self,
        name: &str,
        step: impl FnOnce() -> Result<Outcome, InstallError>,
    ) -> Result<(), InstallError> {
        let log = self.runner.log();
        match step() {
            Ok(Outcome::Done) => {
                log.record_step(name, self.done_status(), None);
                Ok(())
            }
            Ok(Outcome::Skipped(reason)) => {
                log.debug(&format!("{name} skipped: {reason}"));
                log.record_step(name, StepStatus::Skipped, Some(&reason));
                Ok(())
            }
            Err(e) => {
                log.error(&format!("{name}: {e}"));
                log.record_step(name, StepStatus::Failed, Some(&e.to_string()));
                Err(e)
            }
        }
    }

    const fn done_status(&self) -> StepStatus {
        if self.options.dry_run {
            StepStatus::DryRun
        } else {
            StepStatus::Ok
        }
    }

    fn confirm_legacy_target(&self) -> Result<(), UsageError> {
        if !self.options.has_legacy_target() || self.options.force {
            return Ok(());
        }
        let log = self.runner.log();
        let target = self.options.target.display();
        log.warn("the semantics of grml2usb has changed.");
        log.warn(&format!(
            "Instead of using grml2usb /path/to/iso {target} you might want to use \
             grml2usb /path/to/iso /dev/... instead."
        ));
        confirm_or_abort(self.prompt.as_ref(), false, "Do you really want to continue?")
    }

    fn check_sources(&self) -> Result<(), UsageError> {
        match self.options.sources.iter().find(|s| !s.exists()) {
            Some(missing) => Err(UsageError::InvalidUsage(format!(
                "specified image {} could not be read",
                missing.display()
            ))),
            None => Ok(()),
        }
    }

    /// External programs this invocation will run, in the order they are
    /// first needed.
    #[must_use]
    pub fn required_tools(&self, target: &InstallTarget) -> Vec<String> {
        let opts = &self.options;
        let device = !target.is_directory();
        let has_iso = opts.sources.iter().any(|s| !s.is_dir());
        let mut tools: Vec<String> = Vec::new();
        if has_iso || (device && !opts.dry_run) {
            tools.extend(["mount".to_string(), "umount".to_string()]);
        }
        if device {
            tools.push("blkid".to_string());
        }
        if opts.dry_run || !device {
            return tools;
        }
        if opts.fat16 {
            tools.push("mkfs.vfat".to_string());
        }
        if opts.mode.installs_bootloader() {
            tools.push(
                match opts.bootloader {
                    BootloaderKind::Syslinux => "syslinux",
                    BootloaderKind::Grub => "grub-install",
                }
                .to_string(),
            );
        }
        if opts.mbr {
            tools.push(opts.lilo.display().to_string());
        }
        tools
    }

    fn check_tools(&self, target: &InstallTarget) -> Result<(), ExecError> {
        let missing: Vec<String> = self
            .required_tools(target)
            .into_iter()
            .filter(|tool| !self.runner.which(tool))
            .collect();
        for tool in &missing {
            self.runner
                .log()
                .error(&format!("required tool {tool} is not available"));
        }
        match missing.into_iter().next() {
            Some(tool) => Err(ExecError::ToolMissing(tool)),
            None => Ok(()),
        }
    }

    /// Confirmations, formatting and the FAT check for device targets.
    fn prepare_device(&self, target: &InstallTarget) -> Result<(), InstallError> {
        let TargetKind::Device { removable, .. } = &target.kind else {
            self.runner.log().info(&format!(
                "{} is a directory, not mounting it",
                target.path.display()
            ));
            return Ok(());
        };
        let force = self.options.force;
        if !removable {
            self.runner.log().warn(&format!(
                "the specified device {} does not look like a removable usb device.",
                target.path.display()
            ));
            confirm_or_abort(self.prompt.as_ref(), force, "Do you really want to continue?")?;
        }
        if self.options.fat16 {
            confirm_or_abort(
                self.prompt.as_ref(),
                force,
                "Are you sure you want to format the device with a fat16 filesystem?",
            )?;
            self.execute("Format FAT16", || {
                let part = target.path.to_string_lossy();
                self.runner.log().info(&format!(
                    "Formating partition with fat16 filesystem on {part}"
                ));
                self.runner.apply("mkfs.vfat", &["-F", "16", &*part])?;
                Ok(Outcome::Done)
            })?;
        } else {
            self.classifier.require_fat(&target.path)?;
        }
        Ok(())
    }

    /// Mount, identify, deploy and unmount one image.
    fn install_image(&self, source: &Path, target: &InstallTarget) -> Result<Flavour, InstallError> {
        let log = self.runner.log();
        let registry = self.mounts.registry();

        let iso_dir = if source.is_dir() {
            log.info(&format!("using {} as live image directory", source.display()));
            None
        } else {
            Some(TempMountPoint::create(registry)?)
        };
        let iso_mount = match &iso_dir {
            Some(dir) => Some(self.mounts.mount(
                source,
                dir.path(),
                ISO_MOUNT_OPTIONS,
                MountMode::Inspect,
            )?),
            None => None,
        };
        let image_root = iso_dir.as_ref().map_or(source, TempMountPoint::path);

        let target_dir = if target.is_directory() {
            None
        } else {
            Some(TempMountPoint::create(registry)?)
        };
        let target_mount = match &target_dir {
            Some(dir) => Some(self.mounts.mount(&target.path, dir.path(), &[], MountMode::Apply)?),
            None => None,
        };
        let target_root = target_dir
            .as_ref()
            .map_or(target.path.as_path(), TempMountPoint::path);

        let flavour = identify_flavour(image_root)?;
        log.info(&format!("Identified grml flavour \"{flavour}\"."));
        let params = ConfigParams {
            flavour: flavour.clone(),
            boot_options: self.options.boot_options.clone(),
            timestamp: self.timestamp,
        };
        let deployed = self
            .deployer
            .deploy(image_root, target_root, &params, self.options.mode)?;
        log.debug(&format!("{} files deployed", deployed.copied));
        self.runner.sync();

        if let Some(mount) = target_mount {
            mount.release()?;
        }
        if let Some(mount) = iso_mount {
            mount.release()?;
        }
        Ok(flavour)
    }

    fn install_mbr(&self, target: &InstallTarget) -> Result<Outcome, InstallError> {
        if !self.options.mbr {
            self.runner.log().info(
                "You are NOT using the --mbr option. Consider using it if your device does not boot.",
            );
            return Ok(Outcome::Skipped("--mbr not given".to_string()));
        }
        let Some(disk) = target.disk_path() else {
            return Ok(Outcome::Skipped("target is a directory".to_string()));
        };
        self.bootloader
            .install_mbr(&disk, &self.options.lilo, &self.options.donor_mbr)?;
        Ok(Outcome::Done)
    }

    fn install_bootloader(
        &self,
        target: &InstallTarget,
        any_installed: bool,
    ) -> Result<Outcome, InstallError> {
        if !self.options.mode.installs_bootloader() {
            self.runner.log().info(
                "Not installing bootloader and its files as requested via option copyonly.",
            );
            return Ok(Outcome::Skipped("--copy-only".to_string()));
        }
        let Some(disk) = target.disk_path() else {
            return Ok(Outcome::Skipped("target is a directory".to_string()));
        };
        if !any_installed {
            return Ok(Outcome::Skipped("no image was installed".to_string()));
        }
        match self.options.bootloader {
            BootloaderKind::Syslinux => {
                self.bootloader
                    .install(BootloaderKind::Syslinux, &target.path, &disk, None)?;
            }
            BootloaderKind::Grub => {
                let dir = TempMountPoint::create(self.mounts.registry())?;
                let mount = self
                    .mounts
                    .mount(&target.path, dir.path(), &[], MountMode::Apply)?;
                self.bootloader.install(
                    BootloaderKind::Grub,
                    &target.path,
                    &disk,
                    Some(dir.path()),
                )?;
                self.runner.sync();
                mount.release()?;
            }
        }
        Ok(Outcome::Done)
    }
}
