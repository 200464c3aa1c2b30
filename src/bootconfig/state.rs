//! On-target record of what has been installed, and the syslinux.cfg it
//! renders to.
//!
//! The manifest lives next to `syslinux.cfg` as `grml2usb.toml`. Targets
//! prepared by releases that only wrote marker comments are imported from
//! `syslinux.cfg` the first time they are touched.
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ConfigParams;
use super::syslinux::{FLAVOUR_MARKER, MAIN_MARKER, flavour_config, main_config};
use crate::error::ConfigError;
use crate::flavour::Flavour;

/// Manifest file name below `boot/syslinux/`.
pub const MANIFEST_FILE: &str = "grml2usb.toml";

/// Syslinux configuration file name below `boot/syslinux/`.
pub const CONFIG_FILE: &str = "syslinux.cfg";

/// Flavour that owns the global section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainEntry {
    /// Flavour booted by the default label.
    pub flavour: String,
    /// Extra kernel options of the default label.
    #[serde(default)]
    pub boot_options: String,
    /// Run that wrote the global section.
    pub timestamp: i64,
}

/// One installed flavour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlavourEntry {
    /// Flavour name.
    pub name: String,
    /// Extra kernel options of its entries.
    #[serde(default)]
    pub boot_options: String,
    /// Run that installed it.
    pub timestamp: i64,
}

/// What [`InstallState::merge`] changed for the flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlavourChange {
    /// First install of this flavour.
    Added,
    /// Installed by an earlier run; its entries were regenerated.
    Replaced,
    /// Already installed by this run.
    Unchanged,
}

/// Outcome of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    /// Whether this merge created the global section.
    pub main_written: bool,
    /// What happened to the flavour entries.
    pub flavour: FlavourChange,
}

/// Everything grml2usb has installed on a target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallState {
    /// Owner of the global section, if one was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<MainEntry>,
    /// Installed flavours in install order.
    #[serde(default, rename = "flavour")]
    pub flavours: Vec<FlavourEntry>,
}

impl InstallState {
    /// Load the state of the syslinux directory `dir`.
    ///
    /// Falls back to importing marker comments from `syslinux.cfg` when no
    /// manifest exists, and to an empty state when neither file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let manifest = dir.join(MANIFEST_FILE);
        if manifest.exists() {
            let content = read(&manifest)?;
            return toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: manifest,
                source,
            });
        }
        let config = dir.join(CONFIG_FILE);
        if config.exists() {
            return Ok(Self::from_legacy(&read(&config)?));
        }
        Ok(Self::default())
    }

    /// Rebuild state from a `syslinux.cfg` written without a manifest.
    #[must_use]
    pub fn from_legacy(text: &str) -> Self {
        let mut state = Self::default();
        let mut lines = text.lines();

        let main_ts = lines
            .next()
            .filter(|first| first.starts_with(MAIN_MARKER))
            .and_then(|first| bracketed_after(first, "main config generated at: "))
            .map(parse_timestamp);

        let mut main_flavour: Option<String> = None;
        let mut main_options = String::new();
        let mut awaiting_main_append = false;
        let mut awaiting_append: Option<usize> = None;
        let mut in_global = true;

        for line in lines {
            if let Some(name) = line
                .strip_prefix("# the default option (using ")
                .and_then(|rest| rest.strip_suffix(')'))
            {
                main_flavour = Some(name.to_string());
            } else if in_global && line.trim_end() == "LABEL  grml" {
                awaiting_main_append = true;
            } else if line.starts_with(FLAVOUR_MARKER) {
                in_global = false;
                awaiting_append = parse_flavour_marker(line).map(|(name, ts)| {
                    state.upsert(FlavourEntry {
                        name,
                        boot_options: String::new(),
                        timestamp: ts,
                    })
                });
            } else if let Some(append) = line.strip_prefix("APPEND ") {
                if awaiting_main_append {
                    if let Some(name) = &main_flavour {
                        main_options = options_after_module(append, name);
                    }
                    awaiting_main_append = false;
                } else if let Some(idx) = awaiting_append.take()
                    && let Some(entry) = state.flavours.get_mut(idx)
                    && entry.boot_options.is_empty()
                {
                    entry.boot_options = options_after_module(append, &entry.name);
                }
            }
        }

        if let (Some(timestamp), Some(flavour)) = (main_ts, main_flavour) {
            state.main = Some(MainEntry {
                flavour,
                boot_options: main_options,
                timestamp,
            });
        }
        state
    }

    /// Insert or replace the entry named `entry.name`; returns its index.
    ///
    /// An entry from the same run is kept as is.
    fn upsert(&mut self, entry: FlavourEntry) -> usize {
        match self.flavours.iter().position(|e| e.name == entry.name) {
            Some(idx) => {
                if let Some(existing) = self.flavours.get_mut(idx)
                    && existing.timestamp != entry.timestamp
                {
                    *existing = entry;
                }
                idx
            }
            None => {
                self.flavours.push(entry);
                self.flavours.len() - 1
            }
        }
    }

    /// Record an install of `params.flavour` by the run `params.timestamp`.
    ///
    /// The global section is created only when none exists yet. A flavour
    /// already installed by the same run is left alone; one installed by an
    /// earlier run is replaced.
    pub fn merge(&mut self, params: &ConfigParams) -> MergeReport {
        let main_written = self.main.is_none();
        if main_written {
            self.main = Some(MainEntry {
                flavour: params.flavour.to_string(),
                boot_options: params.boot_options.clone(),
                timestamp: params.timestamp,
            });
        }

        let entry = FlavourEntry {
            name: params.flavour.to_string(),
            boot_options: params.boot_options.clone(),
            timestamp: params.timestamp,
        };
        let flavour = match self.flavours.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) if existing.timestamp == entry.timestamp => FlavourChange::Unchanged,
            Some(existing) => {
                *existing = entry;
                FlavourChange::Replaced
            }
            None => {
                self.flavours.push(entry);
                FlavourChange::Added
            }
        };
        MergeReport {
            main_written,
            flavour,
        }
    }

    /// Render the complete `syslinux.cfg`.
    ///
    /// Entries whose names are not valid flavour tokens (a hand-edited
    /// manifest) are skipped.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(main) = &self.main
            && let Some(params) = params_for(&main.flavour, &main.boot_options, main.timestamp)
        {
            out.push_str(&main_config(&params).to_string());
        }
        for entry in &self.flavours {
            if let Some(params) = params_for(&entry.name, &entry.boot_options, entry.timestamp) {
                out.push_str(&flavour_config(&params).to_string());
            }
        }
        out
    }

    /// Write the manifest and the rendered `syslinux.cfg` into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or a write fails.
    pub fn save(&self, dir: &Path) -> Result<(), ConfigError> {
        let manifest = dir.join(MANIFEST_FILE);
        let content = toml::to_string_pretty(self).map_err(|source| ConfigError::Serialize {
            path: manifest.clone(),
            source,
        })?;
        write(&manifest, &content)?;
        write(&dir.join(CONFIG_FILE), &self.render())
    }
}

fn params_for(name: &str, boot_options: &str, timestamp: i64) -> Option<ConfigParams> {
    let flavour = Flavour::from_version_line(name).filter(|f| f.as_str() == name)?;
    Some(ConfigParams {
        flavour,
        boot_options: boot_options.to_string(),
        timestamp,
    })
}

/// Text between `prefix` and the next `]`.
fn bracketed_after<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let (_, rest) = line.split_once(prefix)?;
    rest.split_once(']').map(|(value, _)| value)
}

/// Legacy timestamps were written as floats (`1229872332.0`).
fn parse_timestamp(raw: &str) -> i64 {
    raw.split('.')
        .next()
        .and_then(|secs| secs.trim().parse().ok())
        .unwrap_or_default()
}

fn parse_flavour_marker(line: &str) -> Option<(String, i64)> {
    let inner = bracketed_after(line, "[grml2usb for ")?;
    let (name, ts) = inner.split_once(": ")?;
    Some((name.to_string(), parse_timestamp(ts)))
}

fn options_after_module(append: &str, flavour: &str) -> String {
    append
        .split_once(&format!("module={flavour}"))
        .map(|(_, rest)| rest.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write(path: &Path, content: &str) -> Result<(), ConfigError> {
    fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
