//! Domain-specific error types for the installer.
//!
//! Internal modules return typed errors while the command handler at the CLI
//! boundary converts them to [`anyhow::Error`] via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! InstallError
//! ├── Device(DeviceError)  malformed paths, probe failures, permissions
//! ├── Exec(ExecError)      missing tools, non-zero exit status
//! ├── Mount(MountError)    mount / umount failures
//! ├── Image(ImageError)    version file and payload problems
//! ├── Config(ConfigError)  settings file and on-target manifest
//! └── Usage(UsageError)    argument and flag-combination violations
//! ```

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for an installation run.
#[derive(Error, Debug)]
pub enum InstallError {
    /// Target device classification failed.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// An external program was missing or failed.
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Mounting or unmounting failed.
    #[error(transparent)]
    Mount(#[from] MountError),

    /// The image does not look like a supported live image.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// A settings file or boot configuration could not be read or written.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The requested invocation is not valid.
    #[error(transparent)]
    Usage(#[from] UsageError),
}

/// Errors raised while inspecting the target device.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The path is not of the form `/dev/<name>`.
    #[error("invalid device path '{0}': expected /dev/<name>")]
    InvalidPath(String),

    /// The filesystem probe tool could not be run.
    #[error("cannot probe filesystem on {device}: {reason}")]
    ProbeUnavailable {
        /// Partition that was probed.
        device: PathBuf,
        /// Why the probe could not run.
        reason: String,
    },

    /// The probed filesystem is not FAT.
    #[error("{device} does not contain a FAT filesystem (found '{found}'), consider --fat16")]
    NotFat {
        /// Partition that was probed.
        device: PathBuf,
        /// Filesystem type reported by the probe, empty when unknown.
        found: String,
    },

    /// The device is not writable by the current user.
    #[error("{0} is not writable by the current user")]
    NotWritable(PathBuf),
}

/// Errors raised by the process runner.
#[derive(Error, Debug)]
pub enum ExecError {
    /// A required external program is not installed.
    #[error("required tool '{0}' not found")]
    ToolMissing(String),

    /// The program ran but exited with a non-zero status.
    #[error(
        "{tool} failed (exit {}): {stderr}",
        .code.map_or_else(|| "signal".to_string(), |c| c.to_string())
    )]
    ExecutionFailed {
        /// Program name.
        tool: String,
        /// Exit code, `None` when terminated by a signal.
        code: Option<i32>,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// The program could not be started at all.
    #[error("failed to execute {tool}: {source}")]
    Spawn {
        /// Program name.
        tool: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors raised by the mount manager.
#[derive(Error, Debug)]
pub enum MountError {
    /// `mount` exited non-zero.
    #[error("mounting {device} on {target} failed: {reason}")]
    Mount {
        /// ISO file or block device.
        device: PathBuf,
        /// Mount point.
        target: PathBuf,
        /// Rendered runner error.
        reason: String,
    },

    /// `umount` exited non-zero.
    #[error("unmounting {target} failed: {reason}")]
    Unmount {
        /// Mount point.
        target: PathBuf,
        /// Rendered runner error.
        reason: String,
    },

    /// A mount point directory could not be created or inspected.
    #[error("mount point {path}: {source}")]
    Io {
        /// Affected path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors raised while reading the live image.
#[derive(Error, Debug)]
pub enum ImageError {
    /// No version descriptor was found below the image root.
    #[error("could not find {file} below {root}")]
    MissingVersionFile {
        /// Name of the descriptor file searched for.
        file: String,
        /// Image root that was searched.
        root: PathBuf,
    },

    /// The descriptor does not start with a flavour token.
    #[error("malformed version file {path}: '{line}'")]
    MalformedVersionFile {
        /// Descriptor path.
        path: PathBuf,
        /// First line of the descriptor.
        line: String,
    },

    /// A required asset is absent from the image.
    #[error("required file '{0}' missing from image")]
    PayloadMissing(String),

    /// Reading or writing a payload file failed.
    #[error("{path}: {source}")]
    Io {
        /// Affected path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors raised while reading or writing configuration files.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading or writing the file failed.
    #[error("{path}: {source}")]
    Io {
        /// Affected path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for its schema.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Affected path.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },

    /// The state could not be serialized.
    #[error("failed to serialize {path}: {source}")]
    Serialize {
        /// Destination path.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::ser::Error,
    },
}

/// Errors raised by invalid invocations.
#[derive(Error, Debug)]
pub enum UsageError {
    /// Argument-count or flag-combination violation.
    #[error("invalid usage: {0}")]
    InvalidUsage(String),

    /// The option is recognised but not implemented.
    #[error("option {0} is not supported yet")]
    Unsupported(String),

    /// The installer needs uid 0 for anything but a dry run.
    #[error("please run grml2usb with uid 0 (root)")]
    NotRoot,

    /// The user answered "no" to a confirmation prompt.
    #[error("aborted by user")]
    Declined,
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn invalid_path_display() {
        let e = DeviceError::InvalidPath("foobar".to_string());
        assert_eq!(
            e.to_string(),
            "invalid device path 'foobar': expected /dev/<name>"
        );
    }

    #[test]
    fn execution_failed_display_with_code() {
        let e = ExecError::ExecutionFailed {
            tool: "syslinux".to_string(),
            code: Some(1),
            stderr: "no such device".to_string(),
        };
        assert_eq!(e.to_string(), "syslinux failed (exit 1): no such device");
    }

    #[test]
    fn execution_failed_display_without_code() {
        let e = ExecError::ExecutionFailed {
            tool: "lilo".to_string(),
            code: None,
            stderr: String::new(),
        };
        assert!(e.to_string().contains("exit signal"));
    }

    #[test]
    fn spawn_error_has_source() {
        use std::error::Error as StdError;
        let e = ExecError::Spawn {
            tool: "mount".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "missing"),
        };
        assert!(e.source().is_some());
    }

    #[test]
    fn payload_missing_display() {
        let e = ImageError::PayloadMissing("linux26".to_string());
        assert_eq!(e.to_string(), "required file 'linux26' missing from image");
    }

    #[test]
    fn install_error_is_transparent() {
        let e: InstallError = UsageError::Unsupported("--kernel".to_string()).into();
        assert_eq!(e.to_string(), "option --kernel is not supported yet");
    }

    #[test]
    fn mount_error_converts_to_install_error() {
        let e: InstallError = MountError::Unmount {
            target: PathBuf::from("/tmp/x"),
            reason: "busy".to_string(),
        }
        .into();
        assert!(matches!(e, InstallError::Mount(_)));
    }

    #[test]
    fn config_parse_error_names_the_file() {
        let source = toml::from_str::<toml::Table>("= nope").unwrap_err();
        let e = ConfigError::Parse {
            path: PathBuf::from("/etc/grml2usb/grml2usb.toml"),
            source,
        };
        assert!(e.to_string().starts_with("failed to parse /etc/grml2usb/grml2usb.toml"));
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn all_error_types_are_send_sync() {
        assert_send_sync::<InstallError>();
        assert_send_sync::<DeviceError>();
        assert_send_sync::<ExecError>();
        assert_send_sync::<MountError>();
        assert_send_sync::<ImageError>();
        assert_send_sync::<ConfigError>();
        assert_send_sync::<UsageError>();
    }

    #[test]
    fn install_error_converts_to_anyhow() {
        let e: InstallError = DeviceError::NotWritable(PathBuf::from("/dev/sdb")).into();
        let _anyhow_err: anyhow::Error = e.into();
    }
}
