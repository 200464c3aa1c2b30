//! Boot loader configuration generation.
//!
//! - **[`syslinux`]** typed stanza records and their text form
//! - **[`grub`]** single-flavour GRUB legacy menu
//! - **[`state`]** on-target manifest driving `syslinux.cfg`
pub mod grub;
pub mod state;
pub mod syslinux;

use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::flavour::Flavour;
use crate::logging::Log;

pub use state::{FlavourChange, InstallState, MergeReport};

/// Inputs shared by every configuration template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigParams {
    /// Flavour being installed.
    pub flavour: Flavour,
    /// Extra kernel options appended to every live entry.
    pub boot_options: String,
    /// Run identifier, seconds since the epoch.
    pub timestamp: i64,
}

/// Write `menu.lst`, merge `syslinux.cfg` and rewrite `boot.msg` below
/// `target`.
///
/// # Errors
///
/// Returns an error if a file cannot be read, parsed or written.
pub fn write_boot_configs(
    target: &Path,
    params: &ConfigParams,
    log: &dyn Log,
) -> Result<MergeReport, ConfigError> {
    let grub_dir = target.join("boot/grub");
    let syslinux_dir = target.join("boot/syslinux");
    for dir in [&grub_dir, &syslinux_dir] {
        fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.clone(),
            source,
        })?;
    }

    log.debug("generating grub configuration");
    write(&grub_dir.join("menu.lst"), &grub::menu_lst(params))?;

    log.info("Generating syslinux configuration");
    let mut state = InstallState::load(&syslinux_dir)?;
    let report = state.merge(params);
    if report.main_written {
        log.info(&format!(
            "{} is installed as the default boot entry",
            params.flavour
        ));
    }
    match report.flavour {
        FlavourChange::Unchanged => {
            log.debug(&format!("entries for {} already present", params.flavour));
        }
        FlavourChange::Replaced => {
            log.info(&format!("replacing earlier entries for {}", params.flavour));
        }
        FlavourChange::Added => {}
    }
    state.save(&syslinux_dir)?;
    log.info(&format!(
        "boot flavour {} by typing '{}' at the boot prompt",
        params.flavour, params.flavour
    ));

    log.debug("generating syslinux splash boot.msg");
    write(
        &syslinux_dir.join("boot.msg"),
        &syslinux::splash_message(params.flavour.as_str()),
    )?;
    Ok(report)
}

fn write(path: &Path, content: &str) -> Result<(), ConfigError> {
    fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
