//! Install grml live images onto USB devices.
//!
//! Takes one or more ISO files or live image directories and a target
//! partition (or directory), copies kernel, initrd and squashfs onto it,
//! merges a syslinux configuration able to boot every installed flavour and
//! optionally writes a boot loader and master boot record.
//!
//! - **[`orchestrator`]** the installation sequence
//! - **[`device`]**, **[`mount`]**, **[`flavour`]** target and image inspection
//! - **[`deploy`]**, **[`bootconfig`]**, **[`bootloader`]** writing the target
//! - **[`exec`]**, **[`registry`]**, **[`prompt`]**, **[`logging`]** plumbing
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod bootconfig;
pub mod bootloader;
pub mod cli;
pub mod commands;
pub mod config;
pub mod deploy;
pub mod device;
pub mod error;
pub mod exec;
pub mod flavour;
pub mod logging;
pub mod mount;
pub mod orchestrator;
pub mod prompt;
pub mod registry;
