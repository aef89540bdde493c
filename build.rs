// SPDX-License-Identifier: MPL-2.0

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=VIDMASK_VERSION");

    // Packagers set VIDMASK_VERSION when building outside a git checkout
    let version = std::env::var("VIDMASK_VERSION")
        .ok()
        .or_else(git_describe)
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// "0.1.0", "0.1.0-5-gabcdef1" or "0.1.0-dirty" style version from git
fn git_describe() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--dirty", "--match", "v*"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let described = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let version = described.strip_prefix('v').unwrap_or(&described);
    (!version.is_empty()).then(|| version.to_string())
}
