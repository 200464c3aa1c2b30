#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::wildcard_imports,
    clippy::indexing_slicing
)]
//! Integration tests for the install command.
//!
//! These drive [`Installer`](grml2usb::orchestrator::Installer) end-to-end
//! against live image directories and a directory target, so no device is
//! mounted and every external program call is recorded.

mod common;

use std::path::Path;

use common::*;
use grml2usb::bootloader::BootloaderInstaller;
use grml2usb::config::DeployMode;
use grml2usb::error::{DeviceError, InstallError};

// ---------------------------------------------------------------------------
// Full deployment
// ---------------------------------------------------------------------------

#[test]
fn deploys_payload_and_configuration() {
    let scenario = Scenario::new();
    let image = scenario.add_image("grml-small");
    let report = scenario
        .installer(scenario.options(vec![image]), 1_226_000_000)
        .run()
        .unwrap();

    assert_eq!(report.installed.len(), 1);
    assert!(report.failed.is_empty());
    assert_eq!(
        scenario.read_target("boot/release/grml-small/linux26"),
        "grml-small:boot/grml/linux26"
    );
    assert_eq!(
        scenario.read_target("live/grml-small.squashfs"),
        "grml-small:live/grml-small.squashfs"
    );
    assert_eq!(
        scenario.read_target("live/grml-small.module"),
        "grml-small:live/filesystem.module"
    );
    assert_eq!(scenario.read_target("boot/syslinux/f10"), "grml-small:boot/isolinux/f10");
    assert_eq!(scenario.read_target("boot/grub/stage2_eltorito"), "stage2");

    let cfg = scenario.read_target("boot/syslinux/syslinux.cfg");
    assert!(cfg.contains("LABEL  grml-small\n"));
    assert!(cfg.starts_with(
        "## main syslinux configuration - generated by grml2usb [main config generated at: 1226000000]"
    ));
    assert!(scenario.read_target("boot/syslinux/boot.msg").ends_with("grml-small\n"));
    assert!(scenario.read_target("boot/grub/menu.lst").contains("grml-small"));

    // a directory target is neither mounted nor given a boot loader
    assert_eq!(scenario.executor.calls(), vec!["sync"]);
}

#[test]
fn boot_options_reach_every_live_entry() {
    let scenario = Scenario::new();
    let image = scenario.add_image("grml64");
    let mut opts = scenario.options(vec![image]);
    opts.boot_options = "lang=de  ssh=secret".to_string();
    scenario.installer(opts, 1).run().unwrap();

    let cfg = scenario.read_target("boot/syslinux/syslinux.cfg");
    let live_entries: Vec<&str> = cfg
        .lines()
        .filter(|l| l.starts_with("APPEND initrd=/boot/release/"))
        .collect();
    assert!(!live_entries.is_empty());
    for line in live_entries {
        assert!(line.ends_with(" lang=de ssh=secret"), "{line}");
    }
}

// ---------------------------------------------------------------------------
// Multiple flavours and repeated runs
// ---------------------------------------------------------------------------

#[test]
fn two_images_in_one_run() {
    let scenario = Scenario::new();
    let small = scenario.add_image("grml-small");
    let big = scenario.add_image("grml64");
    let report = scenario
        .installer(scenario.options(vec![small, big]), 42)
        .run()
        .unwrap();

    assert_eq!(report.installed.len(), 2);
    let cfg = scenario.read_target("boot/syslinux/syslinux.cfg");
    assert_eq!(cfg.matches("[main config generated at: 42]").count(), 1);
    assert_eq!(cfg.matches("LABEL  grml-small\n").count(), 1);
    assert_eq!(cfg.matches("LABEL  grml64\n").count(), 1);
    assert!(cfg.contains("# the default option (using grml-small)"));
    assert!(scenario.read_target("boot/syslinux/boot.msg").ends_with("grml64\n"));
}

#[test]
fn same_run_twice_is_idempotent() {
    let scenario = Scenario::new();
    let image = scenario.add_image("grml-small");
    scenario
        .installer(scenario.options(vec![image.clone()]), 7)
        .run()
        .unwrap();
    let first = scenario.read_target("boot/syslinux/syslinux.cfg");
    scenario
        .installer(scenario.options(vec![image]), 7)
        .run()
        .unwrap();
    assert_eq!(scenario.read_target("boot/syslinux/syslinux.cfg"), first);
}

#[test]
fn later_run_replaces_flavour_but_keeps_main_config() {
    let scenario = Scenario::new();
    let image = scenario.add_image("grml-small");
    scenario
        .installer(scenario.options(vec![image.clone()]), 100)
        .run()
        .unwrap();
    scenario
        .installer(scenario.options(vec![image]), 200)
        .run()
        .unwrap();

    let cfg = scenario.read_target("boot/syslinux/syslinux.cfg");
    assert!(cfg.contains("[main config generated at: 100]"));
    assert!(!cfg.contains("[main config generated at: 200]"));
    assert_eq!(cfg.matches("LABEL  grml-small\n").count(), 1);
    assert!(cfg.contains("[grml2usb for grml-small: 200]"));
    assert!(!cfg.contains("[grml2usb for grml-small: 100]"));
}

#[test]
fn manifest_records_installed_flavours() {
    let scenario = Scenario::new();
    let small = scenario.add_image("grml-small");
    let big = scenario.add_image("grml64");
    scenario
        .installer(scenario.options(vec![small, big]), 5)
        .run()
        .unwrap();
    let manifest: toml::Table =
        toml::from_str(&scenario.read_target("boot/syslinux/grml2usb.toml")).unwrap();
    let flavours = manifest["flavour"].as_array().unwrap();
    assert_eq!(flavours.len(), 2);
    assert_eq!(flavours[0]["name"].as_str(), Some("grml-small"));
    assert_eq!(flavours[1]["name"].as_str(), Some("grml64"));
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

#[test]
fn copy_only_writes_no_boot_configuration() {
    let scenario = Scenario::new();
    let image = scenario.add_image("grml-small");
    let mut opts = scenario.options(vec![image]);
    opts.mode = DeployMode::CopyOnly;
    scenario.installer(opts, 1).run().unwrap();

    assert!(scenario.target.path().join("live/grml-small.squashfs").is_file());
    assert!(!scenario.target.path().join("boot/syslinux").exists());
    assert!(!scenario.target.path().join("boot/grub").exists());
}

#[test]
fn bootloader_only_copies_no_payload() {
    let scenario = Scenario::new();
    let image = scenario.add_image("grml-small");
    let mut opts = scenario.options(vec![image]);
    opts.mode = DeployMode::BootloaderOnly;
    scenario.installer(opts, 1).run().unwrap();

    assert!(!scenario.target.path().join("live").exists());
    assert!(!scenario.target.path().join("boot/release").exists());
    assert!(scenario.target.path().join("boot/syslinux/syslinux.cfg").is_file());
}

#[test]
fn dry_run_identifies_but_writes_nothing() {
    let scenario = Scenario::new();
    let image = scenario.add_image("grml-small");
    let mut opts = scenario.options(vec![image]);
    opts.dry_run = true;
    let report = scenario.installer(opts, 1).run().unwrap();

    assert_eq!(report.installed[0].as_str(), "grml-small");
    assert!(std::fs::read_dir(scenario.target.path()).unwrap().next().is_none());
    assert!(scenario.executor.calls().is_empty());
}

#[test]
fn broken_image_is_reported() {
    let scenario = Scenario::new();
    let image = scenario.add_image("grml-small");
    std::fs::remove_file(image.join("boot/grml/linux26")).unwrap();
    let report = scenario
        .installer(scenario.options(vec![image.clone()]), 1)
        .run()
        .unwrap();

    assert!(report.installed.is_empty());
    assert_eq!(report.failed, vec![image]);
    assert!(!scenario.target.path().join("live").exists());
}

#[test]
fn symlinked_kernel_is_deployed() {
    let scenario = Scenario::new();
    let image = scenario.add_image("grml-small");
    let kernel = image.join("boot/grml/linux26");
    std::fs::rename(&kernel, image.join("boot/grml/vmlinuz-2.6.26-grml")).unwrap();
    std::os::unix::fs::symlink("vmlinuz-2.6.26-grml", &kernel).unwrap();
    let report = scenario
        .installer(scenario.options(vec![image]), 1)
        .run()
        .unwrap();

    assert_eq!(report.installed.len(), 1);
    assert_eq!(
        scenario.read_target("boot/release/grml-small/linux26"),
        "grml-small:boot/grml/linux26"
    );
}

// ---------------------------------------------------------------------------
// Master boot record
// ---------------------------------------------------------------------------

#[test]
fn mbr_on_non_writable_path_runs_no_tool() {
    let scenario = Scenario::new();
    let installer = BootloaderInstaller::new(scenario.runner(false));
    let err = installer
        .install_mbr(
            &scenario.target.path().join("missing-disk"),
            Path::new("/bin/true"),
            Path::new("/usr/lib/syslinux/mbr.bin"),
        )
        .unwrap_err();

    assert!(matches!(
        err,
        InstallError::Device(DeviceError::NotWritable(_))
    ));
    assert!(scenario.executor.calls().is_empty());
}
