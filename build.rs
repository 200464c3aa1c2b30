use std::process::Command;

fn main() {
    // Release packaging sets GRML2USB_VERSION; local builds use git describe.
    if let Ok(version) = std::env::var("GRML2USB_VERSION") {
        println!("cargo:rustc-env=GRML2USB_VERSION={version}");
    } else if let Ok(output) = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        && output.status.success()
    {
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        println!("cargo:rustc-env=GRML2USB_VERSION={version}");
    }

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");
    println!("cargo:rerun-if-env-changed=GRML2USB_VERSION");
}
