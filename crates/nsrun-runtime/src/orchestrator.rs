//! Drives one container launch from configuration to cleanup.
//!
//! Resources are acquired in a fixed order (descriptor, cgroup, network
//! link, process) and recorded as they are acquired. Whatever happens to
//! the launch, everything recorded is released in reverse order before
//! [`Orchestrator::run`] returns.

use std::path::PathBuf;

use nsrun_common::config::RunConfig;
use nsrun_common::error::NsrunError;
use nsrun_core::cgroup::{self, Cgroup};
use nsrun_core::namespace::NamespaceDescriptor;
use nsrun_core::network::{self, CommandRunner, NetworkProvisioner, ProvisionedLink, SystemRunner};

use crate::cancel::CancelHandle;
use crate::error::{FailureCategory, RunError, at};
use crate::process::{self, ChildNetwork, EntryPlan, LaunchedChild};
use crate::registry::ContainerRegistry;
use crate::state::{LaunchState, StateTracker};

/// Result of a launch whose container ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Host PID the container ran as.
    pub pid: u32,
    /// The container's exit status, or 128 plus the signal that killed it.
    pub exit_code: i32,
    /// Cgroup the container ran in. Already removed.
    pub cgroup: PathBuf,
}

/// Resources a launch holds, released in reverse field order.
#[derive(Debug, Default)]
struct Acquired {
    descriptor: Option<String>,
    cgroup: Option<Cgroup>,
    link: Option<ProvisionedLink>,
    child: Option<u32>,
}

/// Launches containers and owns the registry of live descriptors.
#[derive(Debug)]
pub struct Orchestrator<R: CommandRunner = SystemRunner> {
    network: NetworkProvisioner<R>,
    registry: ContainerRegistry,
    cancel: CancelHandle,
    last_states: Vec<LaunchState>,
}

impl Orchestrator {
    /// Creates an orchestrator that runs the system's `ip` and `nsenter`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_runner(SystemRunner)
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CommandRunner> Orchestrator<R> {
    /// Creates an orchestrator issuing network commands through `runner`.
    pub fn with_runner(runner: R) -> Self {
        Self {
            network: NetworkProvisioner::new(runner),
            registry: ContainerRegistry::new(),
            cancel: CancelHandle::new(),
            last_states: Vec::new(),
        }
    }

    /// Returns a handle that cancels the current or next launch.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Returns the registry of descriptors for launches in progress.
    #[must_use]
    pub const fn registry(&self) -> &ContainerRegistry {
        &self.registry
    }

    /// Returns the network provisioner.
    #[must_use]
    pub const fn network(&self) -> &NetworkProvisioner<R> {
        &self.network
    }

    /// Returns the states the most recent launch passed through.
    #[must_use]
    pub fn last_run_states(&self) -> &[LaunchState] {
        &self.last_states
    }

    /// Launches the container described by `config` and waits for it.
    ///
    /// Returns the container's own exit status on success. Every acquired
    /// resource has been released by the time this returns, whether the
    /// launch succeeded or not.
    ///
    /// # Errors
    ///
    /// Returns a [`RunError`] whose category names the failed stage.
    pub fn run(&mut self, config: &RunConfig) -> Result<RunOutcome, RunError> {
        let mut states = StateTracker::new();
        let mut acquired = Acquired::default();

        let result = self.launch(config, &mut states, &mut acquired);
        if let Err(e) = &result {
            tracing::error!(error = %e, state = %states.current(), "launch failed, cleaning up");
        }
        self.release(acquired);
        states.advance(LaunchState::Cleaned);

        self.last_states = states.history().to_vec();
        self.cancel.reset();
        result
    }

    fn launch(
        &mut self,
        config: &RunConfig,
        states: &mut StateTracker,
        acquired: &mut Acquired,
    ) -> Result<RunOutcome, RunError> {
        config.validate().map_err(at(FailureCategory::InvalidArgument))?;
        if let Some(net) = &config.network {
            network::validate::network_config(net).map_err(at(FailureCategory::InvalidArgument))?;
        }
        self.checkpoint()?;

        let name = self.allocate_descriptor(config)?;
        acquired.descriptor = Some(name.clone());
        states.advance(LaunchState::NamespaceAllocated);

        let cgroup = Cgroup::create(&config.cgroup_root, &cgroup::next_group_name())
            .map_err(at(FailureCategory::Cgroup))?;
        acquired.cgroup = Some(cgroup.clone());
        states.advance(LaunchState::CgroupCreated);

        cgroup
            .apply_limits(&config.limits)
            .map_err(at(FailureCategory::Cgroup))?;
        states.advance(LaunchState::LimitsApplied);

        let child_network = match &config.network {
            Some(net) => {
                let link = self
                    .network
                    .provision(net)
                    .map_err(at(FailureCategory::Network))?;
                let child = ChildNetwork {
                    if_name: link.container_if.clone(),
                    address: net.address.clone(),
                    gateway: net.gateway.clone(),
                };
                acquired.link = Some(link);
                states.advance(LaunchState::NetworkProvisioned);
                Some(child)
            }
            None => None,
        };
        self.checkpoint()?;

        let LaunchedChild { pid, gate } = self.spawn(&name, child_network, config.strict)?;
        acquired.child = Some(pid);
        self.cancel.track(pid);
        states.advance(LaunchState::ProcessLaunched);

        if let Err(e) = cgroup.attach_process(pid) {
            if config.strict {
                return Err(RunError::new(FailureCategory::Attach, e));
            }
            tracing::warn!(pid, error = %e, "container runs without cgroup limits");
        }

        if let Some(container_if) = acquired.link.as_ref().map(|l| l.container_if.clone()) {
            match self.network.move_to_namespace(&container_if, pid) {
                Ok(()) => acquired.link = None,
                Err(e) if config.strict => {
                    return Err(RunError::new(FailureCategory::Attach, e));
                }
                Err(e) => {
                    tracing::warn!(pid, if_name = %container_if, error = %e, "container runs without network");
                }
            }
        }

        self.registry
            .get_mut(&name)
            .ok_or_else(|| missing_descriptor(&name))
            .and_then(|d| d.mark_launched(pid))
            .map_err(at(FailureCategory::Launch))?;

        if let Err(e) = gate.release() {
            tracing::warn!(pid, error = %e, "container exited before release");
        }
        states.advance(LaunchState::Attached);
        states.advance(LaunchState::Running);

        let exit_code = process::wait_for_exit(pid).map_err(at(FailureCategory::Launch))?;
        acquired.child = None;
        self.cancel.untrack();
        states.advance(LaunchState::Exited);
        tracing::info!(pid, exit_code, "container exited");

        if self.cancel.is_cancelled() {
            return Err(RunError::cancelled());
        }
        Ok(RunOutcome {
            pid,
            exit_code,
            cgroup: cgroup.path().to_path_buf(),
        })
    }

    fn allocate_descriptor(&mut self, config: &RunConfig) -> Result<String, RunError> {
        let ns = FailureCategory::Namespace;
        let mut descriptor = NamespaceDescriptor::create(config.name.as_str()).map_err(at(ns))?;
        descriptor.set_rootfs(&config.rootfs).map_err(at(ns))?;
        descriptor
            .set_command(config.command.as_str())
            .map_err(at(ns))?;
        if let Some(hostname) = config.hostname.as_deref().filter(|h| !h.is_empty()) {
            descriptor.set_hostname(hostname).map_err(at(ns))?;
        }
        let name = descriptor.name().to_string();
        self.registry.add(descriptor).map_err(at(ns))?;
        Ok(name)
    }

    fn spawn(
        &self,
        name: &str,
        network: Option<ChildNetwork>,
        strict: bool,
    ) -> Result<LaunchedChild, RunError> {
        let launch = FailureCategory::Launch;
        let descriptor = self
            .registry
            .get(name)
            .ok_or_else(|| missing_descriptor(name))
            .map_err(at(launch))?;
        let plan = EntryPlan::new(descriptor, network, strict).map_err(at(launch))?;
        process::spawn(&plan, descriptor.namespaces(), &self.network).map_err(at(launch))
    }

    fn checkpoint(&self) -> Result<(), RunError> {
        if self.cancel.is_cancelled() {
            return Err(RunError::cancelled());
        }
        Ok(())
    }

    fn release(&mut self, acquired: Acquired) {
        if let Some(pid) = acquired.child {
            if let Err(e) = process::kill(pid) {
                tracing::warn!(pid, error = %e, "failed to kill container");
            }
            if let Err(e) = process::wait_for_exit(pid) {
                tracing::warn!(pid, error = %e, "failed to reap container");
            }
            self.cancel.untrack();
        }
        if let Some(link) = acquired.link {
            if let Err(e) = self.network.delete_link(&link.host_if) {
                tracing::warn!(host_if = %link.host_if, error = %e, "failed to delete veth pair");
            }
        }
        if let Some(cgroup) = acquired.cgroup {
            if let Err(e) = cgroup.destroy() {
                tracing::warn!(path = %cgroup.path().display(), error = %e, "failed to remove cgroup");
            }
        }
        if let Some(name) = acquired.descriptor {
            if let Some(descriptor) = self.registry.remove(&name) {
                descriptor.destroy();
            }
        }
    }
}

fn missing_descriptor(name: &str) -> NsrunError {
    NsrunError::Launch {
        message: format!("descriptor '{name}' vanished from the registry"),
    }
}
