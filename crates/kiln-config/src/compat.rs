use anyhow::{bail, Context, Result};
use semver::{Version, VersionReq};

/// Ensure a plugin's host API requirement accepts the given host version.
///
/// `requirement` is a semver requirement string (e.g. `"^0.1"`), and
/// `host_version` the exact version the shell implements.
pub fn check_host_api(requirement: &str, host_version: &str) -> Result<()> {
    if requirement.trim().is_empty() {
        bail!("host_api requirement must not be empty");
    }

    let req = VersionReq::parse(requirement)
        .with_context(|| format!("host_api must be a valid semver requirement: {requirement}"))?;
    let host = Version::parse(host_version)
        .with_context(|| format!("host API version must be valid semver: {host_version}"))?;

    if req.matches(&host) {
        Ok(())
    } else {
        bail!("plugin requires host_api {requirement} but host is {host}")
    }
}
