//! Root filesystem switching via `chroot(2)`.
//!
//! Changes the process's view of `/` to the container rootfs and moves
//! the working directory inside it, so no path resolves outside.

use std::path::Path;

use nsrun_common::error::{NsrunError, Result};

/// Makes `new_root` the calling process's root and changes to `/`.
///
/// # Errors
///
/// Returns an error if `chroot(2)` or `chdir(2)` fails.
#[cfg(target_os = "linux")]
pub fn enter_root(new_root: &Path) -> Result<()> {
    nix::unistd::chroot(new_root).map_err(|e| NsrunError::InNamespace {
        step: "chroot",
        reason: format!("{}: {e}", new_root.display()),
    })?;
    nix::unistd::chdir("/").map_err(|e| NsrunError::InNamespace {
        step: "chdir",
        reason: e.to_string(),
    })?;
    tracing::debug!(root = %new_root.display(), "entered container root");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: container roots require Linux.
#[cfg(not(target_os = "linux"))]
pub fn enter_root(_new_root: &Path) -> Result<()> {
    Err(NsrunError::Unsupported {
        message: "Linux required for container root switching".into(),
    })
}
