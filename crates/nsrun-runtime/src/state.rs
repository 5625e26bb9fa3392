//! Launch state machine.
//!
//! A launch only ever moves forward through these states. Failure at any
//! state unwinds everything acquired so far and ends in `Cleaned`.

use std::fmt;

/// Stage of a single container launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LaunchState {
    /// Configuration accepted.
    Configured,
    /// Namespace descriptor built and registered.
    NamespaceAllocated,
    /// Cgroup directory exists.
    CgroupCreated,
    /// Limits written to the cgroup.
    LimitsApplied,
    /// Bridge and veth pair ready on the host.
    NetworkProvisioned,
    /// Container process exists and is held at its readiness gate.
    ProcessLaunched,
    /// Process bound to its cgroup and network namespace, gate released.
    Attached,
    /// Waiting for the container to exit.
    Running,
    /// Container process reaped.
    Exited,
    /// Every acquired resource released.
    Cleaned,
}

impl fmt::Display for LaunchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configured => "configured",
            Self::NamespaceAllocated => "namespace-allocated",
            Self::CgroupCreated => "cgroup-created",
            Self::LimitsApplied => "limits-applied",
            Self::NetworkProvisioned => "network-provisioned",
            Self::ProcessLaunched => "process-launched",
            Self::Attached => "attached",
            Self::Running => "running",
            Self::Exited => "exited",
            Self::Cleaned => "cleaned",
        };
        f.write_str(name)
    }
}

/// Records the states a launch passes through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTracker {
    history: Vec<LaunchState>,
}

impl StateTracker {
    /// Starts a tracker in [`LaunchState::Configured`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            history: vec![LaunchState::Configured],
        }
    }

    /// Moves to `next`. Transitions that do not move forward are ignored.
    pub fn advance(&mut self, next: LaunchState) {
        let current = self.current();
        if next <= current {
            tracing::warn!(%current, %next, "ignoring backward state transition");
            return;
        }
        tracing::info!(from = %current, to = %next, "launch state");
        self.history.push(next);
    }

    /// Returns the latest state.
    #[must_use]
    pub fn current(&self) -> LaunchState {
        self.history
            .last()
            .copied()
            .unwrap_or(LaunchState::Configured)
    }

    /// Returns every state visited, in order.
    #[must_use]
    pub fn history(&self) -> &[LaunchState] {
        &self.history
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}
