//! Run configuration for a single container launch.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{NsrunError, Result};
use crate::types::{NetworkConfig, ResourceLimits};

/// Everything the orchestrator needs to launch one container.
///
/// Every field has a default, so an empty JSON object (or no flags at
/// all on the command line) is a complete configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Logical name of the namespace descriptor, unique in the registry.
    pub name: String,
    /// Directory that becomes the container's `/`.
    pub rootfs: PathBuf,
    /// Command executed inside the container, resolved through `PATH`.
    pub command: String,
    /// Hostname set in the container's UTS namespace.
    pub hostname: Option<String>,
    /// Resource limits written to the cgroup before the process joins it.
    pub limits: ResourceLimits,
    /// Network endpoint; `None` leaves the container with an empty
    /// network namespace.
    pub network: Option<NetworkConfig>,
    /// Root of the cgroup hierarchy under which the group is created.
    pub cgroup_root: PathBuf,
    /// Turns attach and network-finalisation failures into hard errors.
    pub strict: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            name: constants::DEFAULT_NAME.into(),
            rootfs: PathBuf::from(constants::DEFAULT_ROOTFS),
            command: constants::DEFAULT_COMMAND.into(),
            hostname: Some(constants::DEFAULT_HOSTNAME.into()),
            limits: ResourceLimits::default(),
            network: Some(NetworkConfig::default()),
            cgroup_root: PathBuf::from(constants::CGROUP_ROOT),
            strict: false,
        }
    }
}

impl RunConfig {
    /// Loads a configuration from a JSON file. Missing fields take their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| NsrunError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Checks the fields the orchestrator cannot run without.
    ///
    /// Network names and addresses are validated by the network
    /// provisioner itself, before it issues any command.
    ///
    /// # Errors
    ///
    /// Returns an error if the name, rootfs, or command is empty.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(NsrunError::invalid("container name is empty"));
        }
        if self.rootfs.as_os_str().is_empty() {
            return Err(NsrunError::invalid("rootfs path is empty"));
        }
        if self.command.is_empty() {
            return Err(NsrunError::invalid("command is empty"));
        }
        Ok(())
    }
}
