//! Container networking over a veth pair and a host bridge.
//!
//! The host side of the pair joins a shared bridge; the container side is
//! moved into the container's network namespace and given an address, a
//! default route, and an up state. Every operation validates its names
//! and addresses before any command runs.

pub mod runner;
pub mod validate;

use nsrun_common::error::{NsrunError, Result};
use nsrun_common::types::NetworkConfig;

pub use runner::{CommandRunner, SystemRunner};

const IP: &str = "ip";
const NSENTER: &str = "nsenter";

/// Network namespace a configuration command runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetnsTarget {
    /// The caller's own network namespace, used by the container process
    /// once it is inside its namespace.
    Current,
    /// The namespace of a host-visible PID, entered through `nsenter`.
    Pid(u32),
}

/// Host side of a provisioned link, kept so it can be torn down if the
/// launch fails before the container side leaves the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedLink {
    /// Host end of the veth pair. Deleting it deletes the peer too.
    pub host_if: String,
    /// Container end of the veth pair.
    pub container_if: String,
}

/// Issues link-management commands through a [`CommandRunner`].
#[derive(Debug, Clone, Default)]
pub struct NetworkProvisioner<R = SystemRunner> {
    runner: R,
}

impl<R: CommandRunner> NetworkProvisioner<R> {
    /// Creates a provisioner that runs commands with `runner`.
    pub const fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Returns the underlying runner.
    pub const fn runner(&self) -> &R {
        &self.runner
    }

    /// Validates `config`, then prepares the host side of the link:
    /// bridge, veth pair, bridge membership, and host end up.
    ///
    /// If a step after the veth pair exists fails, the pair is deleted
    /// again before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` without running any command if the
    /// configuration is invalid, otherwise the first failing step's error.
    pub fn provision(&self, config: &NetworkConfig) -> Result<ProvisionedLink> {
        validate::network_config(config)?;
        self.ensure_bridge(&config.bridge)?;
        self.create_veth_pair(&config.host_if, &config.container_if)?;
        let attached = self
            .attach_to_bridge(&config.host_if, &config.bridge)
            .and_then(|()| self.set_link_up(&config.host_if));
        if let Err(e) = attached {
            if let Err(cleanup) = self.delete_link(&config.host_if) {
                tracing::warn!(host_if = %config.host_if, error = %cleanup, "veth cleanup failed");
            }
            return Err(e);
        }
        tracing::info!(
            bridge = %config.bridge,
            host_if = %config.host_if,
            container_if = %config.container_if,
            "host network side provisioned"
        );
        Ok(ProvisionedLink {
            host_if: config.host_if.clone(),
            container_if: config.container_if.clone(),
        })
    }

    /// Ensures a bridge named `name` exists and is up.
    ///
    /// Does nothing if an interface with that name already exists. A
    /// failed creation followed by a successful lookup is treated as
    /// success, since another launch may have created it concurrently.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the bridge cannot be
    /// created or brought up.
    pub fn ensure_bridge(&self, name: &str) -> Result<()> {
        validate::interface_name(name)?;
        if self.link_exists(name)? {
            tracing::debug!(bridge = name, "bridge already present");
            return Ok(());
        }
        let created = self.ip(&["link", "add", "name", name, "type", "bridge"]);
        if let Err(e) = created {
            if self.link_exists(name)? {
                tracing::debug!(bridge = name, "bridge created concurrently");
                return Ok(());
            }
            return Err(creation_error(format!("bridge {name}"), &e));
        }
        self.ip(&["link", "set", name, "up"])
            .map_err(|e| creation_error(format!("bridge {name}"), &e))?;
        tracing::info!(bridge = name, "bridge created");
        Ok(())
    }

    /// Creates a veth pair with ends `host_if` and `container_if`.
    ///
    /// # Errors
    ///
    /// Returns an error if a name is invalid or the pair cannot be created.
    pub fn create_veth_pair(&self, host_if: &str, container_if: &str) -> Result<()> {
        validate::interface_name(host_if)?;
        validate::interface_name(container_if)?;
        self.ip(&[
            "link",
            "add",
            host_if,
            "type",
            "veth",
            "peer",
            "name",
            container_if,
        ])
        .map_err(|e| creation_error(format!("veth pair {host_if}/{container_if}"), &e))?;
        tracing::debug!(host_if, container_if, "veth pair created");
        Ok(())
    }

    /// Makes `bridge` the master of `if_name`.
    ///
    /// # Errors
    ///
    /// Returns an error if a name is invalid or the command fails.
    pub fn attach_to_bridge(&self, if_name: &str, bridge: &str) -> Result<()> {
        validate::interface_name(if_name)?;
        validate::interface_name(bridge)?;
        self.ip(&["link", "set", if_name, "master", bridge])
            .map_err(|e| attach_error(format!("{if_name} to bridge {bridge}"), &e))?;
        tracing::debug!(if_name, bridge, "interface attached to bridge");
        Ok(())
    }

    /// Brings `if_name` up in the host namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the command fails.
    pub fn set_link_up(&self, if_name: &str) -> Result<()> {
        validate::interface_name(if_name)?;
        self.ip(&["link", "set", if_name, "up"])
    }

    /// Moves `if_name` into the network namespace of `target_pid`.
    ///
    /// `target_pid` must be the host-visible PID of an existing process,
    /// not its PID inside a PID namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or PID is invalid or the move fails.
    pub fn move_to_namespace(&self, if_name: &str, target_pid: u32) -> Result<()> {
        validate::interface_name(if_name)?;
        if target_pid == 0 {
            return Err(NsrunError::invalid("target PID must be nonzero"));
        }
        let pid = target_pid.to_string();
        self.ip(&["link", "set", if_name, "netns", &pid])
            .map_err(|e| attach_error(format!("{if_name} to netns of PID {target_pid}"), &e))?;
        tracing::info!(if_name, target_pid, "interface moved into container namespace");
        Ok(())
    }

    /// Configures `if_name` inside the `target` namespace: assigns
    /// `cidr`, brings the interface and loopback up, and installs
    /// `gateway` as the default route when it is non-empty.
    ///
    /// # Errors
    ///
    /// Returns an error if any input is invalid (before any command runs)
    /// or on the first failing sub-step.
    pub fn configure_in_namespace(
        &self,
        target: NetnsTarget,
        if_name: &str,
        cidr: &str,
        gateway: Option<&str>,
    ) -> Result<()> {
        validate::interface_name(if_name)?;
        validate::cidr(cidr)?;
        let gateway = gateway.filter(|g| !g.is_empty());
        if let Some(gw) = gateway {
            validate::gateway(gw)?;
        }
        if target == NetnsTarget::Pid(0) {
            return Err(NsrunError::invalid("target PID must be nonzero"));
        }

        self.ip_in(target, &["addr", "add", cidr, "dev", if_name])?;
        self.ip_in(target, &["link", "set", if_name, "up"])?;
        self.ip_in(target, &["link", "set", "lo", "up"])?;
        if let Some(gw) = gateway {
            self.ip_in(target, &["route", "add", "default", "via", gw])?;
        }
        tracing::debug!(?target, if_name, cidr, gateway, "interface configured in namespace");
        Ok(())
    }

    /// Deletes `if_name`. For a veth end this removes the whole pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the command fails.
    pub fn delete_link(&self, if_name: &str) -> Result<()> {
        validate::interface_name(if_name)?;
        self.ip(&["link", "del", if_name])?;
        tracing::info!(if_name, "link deleted");
        Ok(())
    }

    fn link_exists(&self, name: &str) -> Result<bool> {
        let args = to_args(&["link", "show", name]);
        Ok(self.runner.run(IP, &args)? == Some(0))
    }

    fn ip(&self, args: &[&str]) -> Result<()> {
        self.checked(IP, to_args(args))
    }

    fn ip_in(&self, target: NetnsTarget, args: &[&str]) -> Result<()> {
        match target {
            NetnsTarget::Current => self.ip(args),
            NetnsTarget::Pid(pid) => {
                let mut full = vec![
                    "--target".to_string(),
                    pid.to_string(),
                    "--net".into(),
                    "--".into(),
                    IP.into(),
                ];
                full.extend(args.iter().map(|a| (*a).to_string()));
                self.checked(NSENTER, full)
            }
        }
    }

    fn checked(&self, program: &str, args: Vec<String>) -> Result<()> {
        tracing::debug!(command = %runner::render(program, &args), "running");
        match self.runner.run(program, &args)? {
            Some(0) => Ok(()),
            code => Err(NsrunError::Command {
                command: runner::render(program, &args),
                code,
            }),
        }
    }
}

fn to_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| (*a).to_string()).collect()
}

fn creation_error(resource: String, cause: &NsrunError) -> NsrunError {
    NsrunError::ResourceCreation {
        resource,
        reason: cause.to_string(),
    }
}

fn attach_error(target: String, cause: &NsrunError) -> NsrunError {
    NsrunError::Attach {
        target,
        reason: cause.to_string(),
    }
}
