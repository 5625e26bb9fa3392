//! UTS namespace isolation.
//!
//! Allows the container to have its own hostname.

use nsrun_common::error::{NsrunError, Result};

/// Sets the hostname inside the calling process's UTS namespace.
///
/// # Errors
///
/// Returns an error if `sethostname(2)` fails.
#[cfg(target_os = "linux")]
pub fn set_hostname(hostname: &str) -> Result<()> {
    nix::unistd::sethostname(hostname).map_err(|e| NsrunError::InNamespace {
        step: "sethostname",
        reason: format!("{hostname}: {e}"),
    })?;
    tracing::debug!(hostname, "container hostname set");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: UTS namespaces require Linux.
#[cfg(not(target_os = "linux"))]
pub fn set_hostname(_hostname: &str) -> Result<()> {
    Err(NsrunError::Unsupported {
        message: "Linux required for UTS namespaces".into(),
    })
}
