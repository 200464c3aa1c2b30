//! Top-level command handlers invoked from `main`.
pub mod install;
pub mod version;
