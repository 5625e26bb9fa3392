//! Namespace descriptors for container isolation.
//!
//! A [`NamespaceDescriptor`] records one container's identity and
//! isolation parameters. It owns only memory: killing the process or
//! removing its cgroup is the caller's job and must happen before the
//! descriptor is destroyed.

pub mod uts;

use std::path::{Path, PathBuf};

use nsrun_common::error::{NsrunError, Result};

/// Which kernel namespaces a container requests.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceSet {
    /// Isolate PID namespace.
    pub pid: bool,
    /// Isolate UTS (hostname) namespace.
    pub uts: bool,
    /// Isolate mount namespace.
    pub mount: bool,
    /// Isolate network namespace.
    pub network: bool,
}

impl Default for NamespaceSet {
    fn default() -> Self {
        Self {
            pid: true,
            uts: true,
            mount: true,
            network: true,
        }
    }
}

impl NamespaceSet {
    /// Converts the set into the flags passed to `clone(2)`.
    #[cfg(target_os = "linux")]
    #[must_use]
    pub fn to_clone_flags(self) -> nix::sched::CloneFlags {
        use nix::sched::CloneFlags;

        let mut flags = CloneFlags::empty();
        if self.pid {
            flags |= CloneFlags::CLONE_NEWPID;
        }
        if self.uts {
            flags |= CloneFlags::CLONE_NEWUTS;
        }
        if self.mount {
            flags |= CloneFlags::CLONE_NEWNS;
        }
        if self.network {
            flags |= CloneFlags::CLONE_NEWNET;
        }
        flags
    }
}

/// In-memory record of one container's identity and isolation parameters.
///
/// The name is fixed at creation. The string fields may be overwritten
/// any number of times until the descriptor is launched; after that the
/// descriptor is frozen and a relaunch requires a fresh descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDescriptor {
    name: String,
    rootfs: Option<PathBuf>,
    command: Option<String>,
    hostname: Option<String>,
    pid: Option<u32>,
    namespaces: NamespaceSet,
}

impl NamespaceDescriptor {
    /// Creates an unlaunched descriptor requesting every namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is empty.
    pub fn create(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(NsrunError::invalid("namespace name is empty"));
        }
        tracing::debug!(name = %name, "namespace descriptor created");
        Ok(Self {
            name,
            rootfs: None,
            command: None,
            hostname: None,
            pid: None,
            namespaces: NamespaceSet::default(),
        })
    }

    /// Sets the directory that becomes the container's root.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is empty or the descriptor was launched.
    pub fn set_rootfs(&mut self, rootfs: impl AsRef<Path>) -> Result<()> {
        self.ensure_unlaunched("rootfs")?;
        let rootfs = rootfs.as_ref();
        if rootfs.as_os_str().is_empty() {
            return Err(NsrunError::invalid("rootfs is empty"));
        }
        self.rootfs = Some(rootfs.to_path_buf());
        Ok(())
    }

    /// Sets the command executed inside the container.
    ///
    /// # Errors
    ///
    /// Returns an error if the command is empty or the descriptor was launched.
    pub fn set_command(&mut self, command: impl Into<String>) -> Result<()> {
        self.ensure_unlaunched("command")?;
        self.command = Some(non_empty("command", command.into())?);
        Ok(())
    }

    /// Sets the hostname applied in the container's UTS namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the hostname is empty or the descriptor was launched.
    pub fn set_hostname(&mut self, hostname: impl Into<String>) -> Result<()> {
        self.ensure_unlaunched("hostname")?;
        self.hostname = Some(non_empty("hostname", hostname.into())?);
        Ok(())
    }

    /// Records the host PID of the launched process.
    ///
    /// # Errors
    ///
    /// Returns an error if `pid` is zero or a PID was already recorded.
    pub fn mark_launched(&mut self, pid: u32) -> Result<()> {
        if pid == 0 {
            return Err(NsrunError::invalid("launched PID must be nonzero"));
        }
        if let Some(existing) = self.pid {
            return Err(NsrunError::Launch {
                message: format!(
                    "descriptor '{}' was already launched as PID {existing}",
                    self.name
                ),
            });
        }
        self.pid = Some(pid);
        Ok(())
    }

    /// Releases the descriptor. Kernel resources are not touched.
    pub fn destroy(self) {
        tracing::debug!(name = %self.name, pid = ?self.pid, "namespace descriptor destroyed");
    }

    /// Returns the logical name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the configured root filesystem, if any.
    #[must_use]
    pub fn rootfs(&self) -> Option<&Path> {
        self.rootfs.as_deref()
    }

    /// Returns the configured command, if any.
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    /// Returns the configured hostname, if any.
    #[must_use]
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    /// Returns the host PID, or `None` if never launched.
    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Returns whether the descriptor has been launched.
    #[must_use]
    pub const fn is_launched(&self) -> bool {
        self.pid.is_some()
    }

    /// Returns the requested namespace set.
    #[must_use]
    pub const fn namespaces(&self) -> NamespaceSet {
        self.namespaces
    }

    fn ensure_unlaunched(&self, field: &str) -> Result<()> {
        if self.is_launched() {
            return Err(NsrunError::invalid(format!(
                "cannot set {field} on launched descriptor '{}'",
                self.name
            )));
        }
        Ok(())
    }
}

fn non_empty(field: &str, value: String) -> Result<String> {
    if value.is_empty() {
        return Err(NsrunError::invalid(format!("{field} is empty")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_rejects_empty_name() {
        assert!(NamespaceDescriptor::create("").is_err());
    }

    #[test]
    fn new_descriptor_is_unlaunched() {
        let ns = NamespaceDescriptor::create("web").expect("create");
        assert_eq!(ns.name(), "web");
        assert!(!ns.is_launched());
        assert_eq!(ns.pid(), None);
        assert_eq!(ns.namespaces(), NamespaceSet::default());
    }

    #[test]
    fn setters_overwrite_previous_value() {
        let mut ns = NamespaceDescriptor::create("web").expect("create");
        ns.set_command("/bin/sh").expect("first");
        ns.set_command("/bin/true").expect("second");
        assert_eq!(ns.command(), Some("/bin/true"));
    }

    #[test]
    fn setters_reject_empty_values() {
        let mut ns = NamespaceDescriptor::create("web").expect("create");
        assert!(ns.set_rootfs("").is_err());
        assert!(ns.set_command("").is_err());
        assert!(ns.set_hostname("").is_err());
        assert_eq!(ns.hostname(), None);
    }

    #[test]
    fn launched_descriptor_is_frozen() {
        let mut ns = NamespaceDescriptor::create("web").expect("create");
        ns.set_rootfs("/tmp/fakeroot").expect("rootfs");
        ns.mark_launched(4242).expect("launch");

        assert_eq!(ns.pid(), Some(4242));
        assert!(ns.set_hostname("other").is_err());
        assert!(ns.set_rootfs("/elsewhere").is_err());
        assert_eq!(ns.rootfs(), Some(Path::new("/tmp/fakeroot")));
    }

    #[test]
    fn relaunch_is_rejected() {
        let mut ns = NamespaceDescriptor::create("web").expect("create");
        ns.mark_launched(10).expect("first launch");
        assert!(ns.mark_launched(11).is_err());
        assert_eq!(ns.pid(), Some(10));
    }

    #[test]
    fn zero_pid_is_not_a_launch() {
        let mut ns = NamespaceDescriptor::create("web").expect("create");
        assert!(ns.mark_launched(0).is_err());
        assert!(!ns.is_launched());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn clone_flags_follow_namespace_set() {
        use nix::sched::CloneFlags;

        let all = NamespaceSet::default().to_clone_flags();
        assert!(all.contains(CloneFlags::CLONE_NEWPID | CloneFlags::CLONE_NEWNET));

        let no_net = NamespaceSet {
            network: false,
            ..NamespaceSet::default()
        };
        assert!(!no_net.to_clone_flags().contains(CloneFlags::CLONE_NEWNET));
        assert!(no_net.to_clone_flags().contains(CloneFlags::CLONE_NEWUTS));
    }
}
