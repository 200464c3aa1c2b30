// Shared helpers for integration tests.
//
// Builds fake live image trees and provides a recording executor and a
// scripted prompt so the installer can run end-to-end without touching
// block devices.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use grml2usb::config::{InstallOptions, Settings};
use grml2usb::error::ExecError;
use grml2usb::exec::{ExecResult, Executor, Runner};
use grml2usb::logging::{Log, Logger};
use grml2usb::orchestrator::Installer;
use grml2usb::prompt::Prompt;
use grml2usb::registry::ResourceRegistry;

/// Files making up a minimal live image for `flavour`.
///
/// Creates:
/// - `GRML/grml-version`              version descriptor
/// - `live/<flavour>.squashfs`        root filesystem
/// - `live/filesystem.module`
/// - `boot/grml/{linux26,initrd.gz}`  kernel and initrd
/// - `boot/isolinux/{logo.16,f2..f10}`
pub fn write_live_image(root: &Path, flavour: &str) {
    let mut files = vec![
        format!("live/{flavour}.squashfs"),
        "live/filesystem.module".to_string(),
        "boot/grml/linux26".to_string(),
        "boot/grml/initrd.gz".to_string(),
        "boot/isolinux/logo.16".to_string(),
    ];
    files.extend((2..=10).map(|n| format!("boot/isolinux/f{n}")));
    for file in &files {
        let path = root.join(file);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("create image dir");
        std::fs::write(&path, format!("{flavour}:{file}")).expect("write image file");
    }
    std::fs::create_dir_all(root.join("GRML")).expect("create GRML dir");
    std::fs::write(
        root.join("GRML/grml-version"),
        format!("{flavour} 2008.11 Release Codename Schluchtenscheisser\n"),
    )
    .expect("write grml-version");
}

/// Bundled assets normally shipped below `/usr/share/grml2usb`.
pub fn write_data_dir(root: &Path) {
    let grub = root.join("grub");
    std::fs::create_dir_all(&grub).expect("create grub dir");
    std::fs::write(grub.join("splash.xpm.gz"), "splash").expect("write splash");
    std::fs::write(grub.join("stage2_eltorito"), "stage2").expect("write stage2");
}

/// Executor that records every invocation and succeeds.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl Executor for RecordingExecutor {
    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult, ExecError> {
        let line = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        self.calls.lock().expect("calls lock").push(line);
        Ok(ExecResult {
            stdout: String::new(),
            stderr: String::new(),
            success: true,
            code: Some(0),
        })
    }

    fn which(&self, _program: &str) -> bool {
        true
    }
}

/// Prompt answering every question the same way.
#[derive(Debug, Clone, Copy)]
pub struct FixedPrompt(pub bool);

impl Prompt for FixedPrompt {
    fn confirm(&self, _question: &str) -> bool {
        self.0
    }
}

/// An isolated installation scenario backed by temporary directories.
pub struct Scenario {
    pub images: tempfile::TempDir,
    pub target: tempfile::TempDir,
    pub data: tempfile::TempDir,
    pub executor: Arc<RecordingExecutor>,
}

impl Scenario {
    pub fn new() -> Self {
        let data = tempfile::tempdir().expect("create data dir");
        write_data_dir(data.path());
        Self {
            images: tempfile::tempdir().expect("create images dir"),
            target: tempfile::tempdir().expect("create target dir"),
            data,
            executor: Arc::new(RecordingExecutor::default()),
        }
    }

    /// Add a live image directory for `flavour` and return its path.
    pub fn add_image(&self, flavour: &str) -> PathBuf {
        let root = self.images.path().join(flavour);
        write_live_image(&root, flavour);
        root
    }

    /// Options installing `sources` into the target directory.
    pub fn options(&self, sources: Vec<PathBuf>) -> InstallOptions {
        let mut opts =
            InstallOptions::new(sources, self.target.path().to_path_buf(), &Settings::default());
        opts.data_dir = self.data.path().to_path_buf();
        opts.mount_table = self.data.path().join("mounts");
        opts.sysfs_root = self.data.path().join("sys");
        opts
    }

    pub fn runner(&self, dry_run: bool) -> Runner {
        let log: Arc<dyn Log> = Arc::new(Logger::new("test"));
        Runner::new(
            Arc::clone(&self.executor) as Arc<dyn Executor>,
            log,
            dry_run,
        )
    }

    pub fn installer(&self, opts: InstallOptions, timestamp: i64) -> Installer {
        let runner = self.runner(opts.dry_run);
        Installer::new(
            opts,
            runner,
            Box::new(FixedPrompt(false)),
            Arc::new(ResourceRegistry::new()),
        )
        .with_timestamp(timestamp)
    }

    pub fn read_target(&self, relative: &str) -> String {
        std::fs::read_to_string(self.target.path().join(relative)).expect("read target file")
    }
}
