//! Copying the live payload and boot loader assets onto the target.
use std::fs;
use std::os::unix::fs::PermissionsExt as _;
use std::path::{Path, PathBuf};

use crate::bootconfig::{ConfigParams, MergeReport, syslinux::HELP_SCREENS, write_boot_configs};
use crate::config::DeployMode;
use crate::error::{ImageError, InstallError};
use crate::exec::Runner;
use crate::flavour::search_file;

/// Mode of every copied file: owner and group may rewrite, everyone reads.
const FILE_MODE: u32 = 0o664;

/// Where an asset comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Searched by file name below the image root.
    Image(String),
    /// Shipped with grml2usb at a fixed path.
    Bundled(PathBuf),
}

/// One file to place on the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// Source of the file.
    pub origin: Origin,
    /// Destination relative to the target root.
    pub dest: PathBuf,
    /// Whether the image is unusable without it.
    pub required: bool,
}

impl Asset {
    fn image(name: &str, dest: impl Into<PathBuf>, required: bool) -> Self {
        Self {
            origin: Origin::Image(name.to_string()),
            dest: dest.into(),
            required,
        }
    }

    /// Name used in messages.
    #[must_use]
    pub fn name(&self) -> String {
        match &self.origin {
            Origin::Image(name) => name.clone(),
            Origin::Bundled(path) => path.display().to_string(),
        }
    }
}

/// Assets to copy for `flavour` in `mode`.
#[must_use]
pub fn manifest(flavour: &str, data_dir: &Path, mode: DeployMode) -> Vec<Asset> {
    let mut assets = Vec::new();
    if mode.copies_payload() {
        let release = PathBuf::from("boot/release").join(flavour);
        assets.push(Asset::image(
            &format!("{flavour}.squashfs"),
            format!("live/{flavour}.squashfs"),
            true,
        ));
        assets.push(Asset::image(
            "filesystem.module",
            format!("live/{flavour}.module"),
            true,
        ));
        assets.push(Asset::image("linux26", release.join("linux26"), true));
        assets.push(Asset::image("initrd.gz", release.join("initrd.gz"), true));
    }
    if mode.installs_bootloader() {
        assets.push(Asset::image("logo.16", "boot/syslinux/logo.16", false));
        for screen in HELP_SCREENS {
            assets.push(Asset::image(
                screen,
                PathBuf::from("boot/syslinux").join(screen),
                false,
            ));
        }
        for bundled in ["splash.xpm.gz", "stage2_eltorito"] {
            assets.push(Asset {
                origin: Origin::Bundled(data_dir.join("grub").join(bundled)),
                dest: PathBuf::from("boot/grub").join(bundled),
                required: false,
            });
        }
    }
    assets
}

/// Result of a deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployReport {
    /// Files copied (or that would have been, in dry-run mode).
    pub copied: usize,
    /// Optional assets that were not found.
    pub missing: Vec<String>,
    /// Configuration merge outcome, `None` when no configuration was written.
    pub config: Option<MergeReport>,
}

/// Places one image's files on the target.
#[derive(Debug, Clone)]
pub struct FileDeployer {
    runner: Runner,
    data_dir: PathBuf,
}

impl FileDeployer {
    /// Create a deployer taking bundled assets from `data_dir`.
    #[must_use]
    pub const fn new(runner: Runner, data_dir: PathBuf) -> Self {
        Self { runner, data_dir }
    }

    /// Copy the assets selected by `mode` from `source` to `target` and,
    /// when boot loader assets are part of the mode, write the boot
    /// configuration.
    ///
    /// Every required asset is located before anything is copied, so a
    /// broken image leaves the target untouched. In dry-run mode the copies
    /// and the configuration are only logged.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::PayloadMissing`] for an absent required asset,
    /// or an I/O or configuration error if writing fails.
    pub fn deploy(
        &self,
        source: &Path,
        target: &Path,
        params: &ConfigParams,
        mode: DeployMode,
    ) -> Result<DeployReport, InstallError> {
        let log = self.runner.log();
        let mut report = DeployReport::default();
        let mut plan = Vec::new();

        for asset in manifest(params.flavour.as_str(), &self.data_dir, mode) {
            let found = match &asset.origin {
                Origin::Image(name) => search_file(source, name),
                Origin::Bundled(path) => path.is_file().then(|| path.clone()),
            };
            match found {
                Some(from) => plan.push((from, target.join(&asset.dest))),
                None if asset.required => {
                    return Err(ImageError::PayloadMissing(asset.name()).into());
                }
                None => {
                    log.warn(&format!("{} not found, skipping", asset.name()));
                    report.missing.push(asset.name());
                }
            }
        }

        if mode.copies_payload() && !self.runner.dry_run() {
            log.info("Copying files. This might take a while...");
        }
        for (from, to) in &plan {
            if self.runner.dry_run() {
                log.dry_run(&format!("would copy {} to {}", from.display(), to.display()));
            } else {
                self.install_file(from, to)?;
            }
            report.copied += 1;
        }

        if mode.installs_bootloader() {
            if self.runner.dry_run() {
                log.dry_run(&format!(
                    "would write boot configuration for {} below {}",
                    params.flavour,
                    target.display()
                ));
            } else {
                report.config = Some(write_boot_configs(target, params, log.as_ref())?);
            }
        }
        Ok(report)
    }

    /// Copy `from` to `to`, creating parent directories, with [`FILE_MODE`].
    fn install_file(&self, from: &Path, to: &Path) -> Result<(), ImageError> {
        let io = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ImageError::Io { path, source }
        };
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(io(parent))?;
        }
        self.runner
            .log()
            .debug(&format!("copying {} to {}", from.display(), to.display()));
        fs::copy(from, to).map_err(io(to))?;
        // FAT has no permission bits; a refusal there is expected
        if let Err(e) = fs::set_permissions(to, fs::Permissions::from_mode(FILE_MODE)) {
            self.runner
                .log()
                .debug(&format!("cannot set mode on {}: {e}", to.display()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::exec::test_helpers::{MockExecutor, runner};
    use crate::flavour::Flavour;
    use std::sync::Arc;

    fn image(root: &Path) {
        let files = [
            "GRML/grml-version",
            "live/grml-small.squashfs",
            "live/filesystem.module",
            "boot/grml/linux26",
            "boot/grml/initrd.gz",
            "boot/isolinux/logo.16",
            "boot/isolinux/f2",
            "boot/isolinux/f10",
        ];
        for file in files {
            let path = root.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, file).unwrap();
        }
    }

    fn params() -> ConfigParams {
        ConfigParams {
            flavour: Flavour::from_version_line("grml-small").unwrap(),
            boot_options: String::new(),
            timestamp: 1,
        }
    }

    fn deployer(exec: &Arc<MockExecutor>, dry_run: bool, data_dir: &Path) -> FileDeployer {
        FileDeployer::new(runner(exec, dry_run), data_dir.to_path_buf())
    }

    #[test]
    fn manifest_respects_mode() {
        let data = Path::new("/usr/share/grml2usb");
        assert_eq!(manifest("grml", data, DeployMode::CopyOnly).len(), 4);
        assert_eq!(manifest("grml", data, DeployMode::BootloaderOnly).len(), 12);
        assert_eq!(manifest("grml", data, DeployMode::Both).len(), 16);
    }

    #[test]
    fn copy_only_places_payload() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        image(src.path());
        let exec = Arc::new(MockExecutor::new());
        let report = deployer(&exec, false, src.path())
            .deploy(src.path(), dst.path(), &params(), DeployMode::CopyOnly)
            .unwrap();
        assert_eq!(report.copied, 4);
        assert!(report.config.is_none());
        let kernel = dst.path().join("boot/release/grml-small/linux26");
        assert_eq!(fs::read_to_string(&kernel).unwrap(), "boot/grml/linux26");
        let mode = fs::metadata(&kernel).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, FILE_MODE);
        assert!(dst.path().join("live/grml-small.module").is_file());
        assert!(!dst.path().join("boot/syslinux").exists());
    }

    #[test]
    fn missing_required_asset_aborts_before_copying() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        image(src.path());
        fs::remove_file(src.path().join("boot/grml/initrd.gz")).unwrap();
        let exec = Arc::new(MockExecutor::new());
        let err = deployer(&exec, false, src.path())
            .deploy(src.path(), dst.path(), &params(), DeployMode::Both)
            .unwrap_err();
        assert_eq!(err.to_string(), "required file 'initrd.gz' missing from image");
        assert!(fs::read_dir(dst.path()).unwrap().next().is_none());
    }

    #[test]
    fn missing_cosmetic_assets_are_reported() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        image(src.path());
        let exec = Arc::new(MockExecutor::new());
        let report = deployer(&exec, false, src.path())
            .deploy(src.path(), dst.path(), &params(), DeployMode::Both)
            .unwrap();
        assert!(report.missing.contains(&"f3".to_string()));
        assert!(report.config.is_some());
        assert!(dst.path().join("boot/syslinux/f10").is_file());
        assert!(dst.path().join("boot/syslinux/syslinux.cfg").is_file());
    }

    #[test]
    fn dry_run_writes_nothing() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        image(src.path());
        let exec = Arc::new(MockExecutor::new());
        let report = deployer(&exec, true, src.path())
            .deploy(src.path(), dst.path(), &params(), DeployMode::Both)
            .unwrap();
        assert!(report.copied > 0);
        assert!(report.config.is_none());
        assert!(fs::read_dir(dst.path()).unwrap().next().is_none());
        assert_eq!(exec.call_count(), 0);
    }

    #[test]
    fn bundled_grub_assets_come_from_data_dir() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        image(src.path());
        fs::create_dir_all(data.path().join("grub")).unwrap();
        fs::write(data.path().join("grub/stage2_eltorito"), "stage2").unwrap();
        let exec = Arc::new(MockExecutor::new());
        deployer(&exec, false, data.path())
            .deploy(src.path(), dst.path(), &params(), DeployMode::BootloaderOnly)
            .unwrap();
        assert_eq!(
            fs::read_to_string(dst.path().join("boot/grub/stage2_eltorito")).unwrap(),
            "stage2"
        );
        assert!(!dst.path().join("live").exists());
    }
}
