use std::process::Command;

use anyhow::{Context, Result};

/// Workspace packages in dependency order.
const PACKAGES: &[&str] =
    &["synclane-common", "synclane-domain", "synclane-core", "synclane-infra", "synclane-app"];

/// Check that every package compiles on its own, without features unified
/// across the workspace.
pub fn check_isolated() -> Result<()> {
    println!("Checking {} packages in isolation...", PACKAGES.len());

    for (index, package) in PACKAGES.iter().enumerate() {
        println!("\n[{}/{}] cargo check -p {package} --all-targets", index + 1, PACKAGES.len());

        let status = Command::new("cargo")
            .args(["check", "-p", package, "--all-targets"])
            .status()
            .with_context(|| format!("Failed to run cargo check for '{package}'"))?;

        if !status.success() {
            anyhow::bail!("Package '{package}' failed to compile in isolation");
        }

        println!("✅ {package} compiled");
    }

    // The test helpers are feature gated; make sure they build when enabled.
    println!("\ncargo check -p synclane-common --features test-utils");
    let status = Command::new("cargo")
        .args(["check", "-p", "synclane-common", "--features", "test-utils"])
        .status()
        .context("Failed to run cargo check for synclane-common test-utils")?;
    if !status.success() {
        anyhow::bail!("synclane-common with test-utils failed to compile");
    }

    println!("\n✅ All {} packages compile in isolation!", PACKAGES.len());
    Ok(())
}
