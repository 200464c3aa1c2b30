//! Command: print version information.

/// Version string baked in by the build script, falling back to the crate
/// version.
#[must_use]
pub fn version() -> &'static str {
    option_env!("GRML2USB_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}

/// Print the grml2usb version to stdout.
#[allow(clippy::print_stdout)]
pub fn run() {
    println!("grml2usb {}", version());
}
