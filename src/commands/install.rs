use std::sync::Arc;

use anyhow::Result;

use crate::cli::Cli;
use crate::config::{BootloaderKind, DeployMode, InstallOptions, Settings};
use crate::error::UsageError;
use crate::exec::{Runner, SystemExecutor};
use crate::logging::{Log, Logger};
use crate::orchestrator::Installer;
use crate::prompt::DialoguerPrompt;
use crate::registry::ResourceRegistry;

use super::version::version;

/// Run the installation described by `cli`.
///
/// Mounts and temporary directories are recorded in `registry` so an
/// interrupt handler holding the same registry can release them.
///
/// # Errors
///
/// Returns an error if the invocation is invalid, the user is not root
/// outside dry-run, or an installation step fails.
pub fn run(
    cli: &Cli,
    settings: &Settings,
    log: &Arc<Logger>,
    registry: Arc<ResourceRegistry>,
) -> Result<()> {
    let options = build_options(cli, settings)?;
    if !options.dry_run && !nix::unistd::geteuid().is_root() {
        return Err(UsageError::NotRoot.into());
    }

    log.info(&format!("grml2usb {}", version()));
    log.debug(&format!("options: {options:?}"));

    let runner = Runner::new(
        Arc::new(SystemExecutor),
        Arc::clone(log) as Arc<dyn Log>,
        options.dry_run,
    );
    let installer = Installer::new(options, runner, Box::new(DialoguerPrompt), registry);
    let result = installer.run();

    log.print_summary();

    let report = result?;
    if !report.failed.is_empty() {
        anyhow::bail!(
            "{} of {} images failed to install",
            report.failed.len(),
            report.failed.len() + report.installed.len()
        );
    }
    Ok(())
}

/// Resolve command line flags against site `settings`.
///
/// # Errors
///
/// Returns [`UsageError::InvalidUsage`] if no target was given.
pub fn build_options(cli: &Cli, settings: &Settings) -> Result<InstallOptions, UsageError> {
    let target = cli
        .target()
        .ok_or_else(|| UsageError::InvalidUsage("no target given".to_string()))?;
    let mut opts = InstallOptions::new(cli.sources().to_vec(), target.clone(), settings);

    if let Some(boot_options) = &cli.bootoptions {
        opts.boot_options.clone_from(boot_options);
    }
    opts.mode = if cli.copy_only {
        DeployMode::CopyOnly
    } else if cli.bootloader_only {
        DeployMode::BootloaderOnly
    } else {
        DeployMode::Both
    };
    opts.bootloader = if cli.grub {
        BootloaderKind::Grub
    } else {
        BootloaderKind::Syslinux
    };
    if let Some(lilo) = &cli.lilo {
        opts.lilo.clone_from(lilo);
    }
    opts.dry_run = cli.dry_run;
    opts.fat16 = cli.fat16;
    opts.force = cli.force;
    opts.mbr = cli.mbr;
    opts.unsupported = cli.unsupported_flags();
    Ok(opts)
}
