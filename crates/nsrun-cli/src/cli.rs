//! Command-line arguments and their translation into a [`RunConfig`].

use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Parser, ValueEnum};
use nsrun_common::config::RunConfig;
use nsrun_common::types::{NetworkConfig, parse_cpu, parse_memory};

/// Run one command in fresh namespaces under cgroup limits.
#[derive(Parser, Debug)]
#[command(name = "nsrun", version, about, long_about = None, disable_help_flag = true)]
pub struct Cli {
    /// Directory that becomes the container's root filesystem.
    #[arg(short, long)]
    pub rootfs: Option<PathBuf>,

    /// Hostname inside the container.
    #[arg(short = 'h', long)]
    pub hostname: Option<String>,

    /// Memory ceiling in bytes, or with an M/G suffix. 0 means unlimited.
    #[arg(short, long)]
    pub memory: Option<String>,

    /// CPU share as a fraction of one core, e.g. 0.5. 0 means unlimited.
    #[arg(short, long)]
    pub cpu: Option<String>,

    /// Maximum number of processes. 0 means unlimited.
    #[arg(short, long)]
    pub pids: Option<u64>,

    /// Host bridge the container's veth pair joins.
    #[arg(short, long)]
    pub bridge: Option<String>,

    /// Container address in CIDR form.
    #[arg(short, long = "ip")]
    pub ip: Option<String>,

    /// Default gateway inside the container. Empty for none.
    #[arg(short, long)]
    pub gateway: Option<String>,

    /// Name of the namespace descriptor.
    #[arg(long)]
    pub name: Option<String>,

    /// Host end of the veth pair.
    #[arg(long)]
    pub host_if: Option<String>,

    /// Container end of the veth pair.
    #[arg(long)]
    pub container_if: Option<String>,

    /// Leave the container with an empty network namespace.
    #[arg(long)]
    pub no_network: bool,

    /// Root of the cgroup hierarchy.
    #[arg(long)]
    pub cgroup_root: Option<PathBuf>,

    /// Treat attach and network finalisation failures as fatal.
    #[arg(long)]
    pub strict: bool,

    /// JSON run configuration used as the base for all other flags.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    pub print_config: bool,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Print help.
    #[arg(long, action = ArgAction::Help)]
    pub help: Option<bool>,

    /// Command to execute inside the container. Arguments after it are
    /// ignored; only the command name is passed to the container.
    #[arg(trailing_var_arg = true, num_args = 0.., value_name = "COMMAND")]
    pub command: Vec<String>,
}

/// Log formatter selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per event.
    Json,
}

impl Cli {
    /// Builds the run configuration: the config file (or the defaults) as
    /// the base, then every flag that was passed on top.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be loaded or a limit
    /// does not parse.
    pub fn to_run_config(&self) -> anyhow::Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => RunConfig::default(),
        };

        if let Some(name) = &self.name {
            config.name.clone_from(name);
        }
        if let Some(rootfs) = &self.rootfs {
            config.rootfs.clone_from(rootfs);
        }
        if let Some((command, ignored)) = self.command.split_first() {
            config.command.clone_from(command);
            if !ignored.is_empty() {
                tracing::warn!(command = %command, ?ignored, "arguments after the command are not forwarded");
            }
        }
        if let Some(hostname) = &self.hostname {
            config.hostname = Some(hostname.clone()).filter(|h| !h.is_empty());
        }
        if let Some(root) = &self.cgroup_root {
            config.cgroup_root.clone_from(root);
        }
        config.strict |= self.strict;

        if let Some(memory) = &self.memory {
            config.limits.memory_bytes = parse_memory(memory)?;
        }
        if let Some(cpu) = &self.cpu {
            config.limits.cpu = parse_cpu(cpu)?;
        }
        if let Some(pids) = self.pids {
            config.limits.pids_max = (pids > 0).then_some(pids);
        }

        if self.no_network {
            config.network = None;
        } else if self.has_network_flags() {
            self.apply_network(config.network.get_or_insert_with(NetworkConfig::default));
        }
        Ok(config)
    }

    const fn has_network_flags(&self) -> bool {
        self.bridge.is_some()
            || self.ip.is_some()
            || self.gateway.is_some()
            || self.host_if.is_some()
            || self.container_if.is_some()
    }

    fn apply_network(&self, net: &mut NetworkConfig) {
        if let Some(bridge) = &self.bridge {
            net.bridge.clone_from(bridge);
        }
        if let Some(ip) = &self.ip {
            net.address.clone_from(ip);
        }
        if let Some(gateway) = &self.gateway {
            net.gateway = Some(gateway.clone()).filter(|g| !g.is_empty());
        }
        if let Some(host_if) = &self.host_if {
            net.host_if.clone_from(host_if);
        }
        if let Some(container_if) = &self.container_if {
            net.container_if.clone_from(container_if);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use nsrun_common::types::CpuLimit;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("nsrun").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn no_arguments_yield_defaults() {
        let config = parse(&[]).to_run_config().unwrap();
        assert_eq!(config, RunConfig::default());
    }

    #[test]
    fn short_flags_map_to_fields() {
        let config = parse(&[
            "-r", "/tmp/fakeroot", "-h", "box", "-m", "256M", "-c", "0.5", "-p", "64", "/bin/true",
        ])
        .to_run_config()
        .unwrap();
        assert_eq!(config.rootfs, PathBuf::from("/tmp/fakeroot"));
        assert_eq!(config.hostname.as_deref(), Some("box"));
        assert_eq!(config.command, "/bin/true");
        assert_eq!(config.limits.memory_bytes, Some(256 * 1024 * 1024));
        assert_eq!(
            config.limits.cpu,
            Some(CpuLimit {
                quota_us: 50_000,
                period_us: 100_000
            })
        );
        assert_eq!(config.limits.pids_max, Some(64));
    }

    #[test]
    fn trailing_arguments_are_accepted_and_dropped() {
        let cli = parse(&["-r", "/srv/root", "/bin/echo", "hi", "there"]);
        assert_eq!(cli.command, ["/bin/echo", "hi", "there"]);
        let config = cli.to_run_config().unwrap();
        assert_eq!(config.command, "/bin/echo");
        assert_eq!(config.rootfs, PathBuf::from("/srv/root"));
    }

    #[test]
    fn zero_limits_are_unset() {
        let config = parse(&["-m", "0", "-c", "0", "-p", "0"]).to_run_config().unwrap();
        assert!(config.limits.is_unlimited());
    }

    #[test]
    fn bad_memory_is_an_error() {
        assert!(parse(&["-m", "lots"]).to_run_config().is_err());
    }

    #[test]
    fn network_flags_override_defaults() {
        let config = parse(&["-b", "br1", "-i", "10.1.0.2/16", "-g", ""])
            .to_run_config()
            .unwrap();
        let net = config.network.unwrap();
        assert_eq!(net.bridge, "br1");
        assert_eq!(net.address, "10.1.0.2/16");
        assert_eq!(net.gateway, None);
    }

    #[test]
    fn no_network_wins_over_network_flags() {
        let config = parse(&["--no-network", "-b", "br1"]).to_run_config().unwrap();
        assert!(config.network.is_none());
    }

    #[test]
    fn config_file_is_the_base_and_flags_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"command": "/bin/echo", "rootfs": "/srv/root", "network": null, "limits": {{"pids_max": 10}}}}"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let config = parse(&["--config", path, "-r", "/other"]).to_run_config().unwrap();
        assert_eq!(config.command, "/bin/echo");
        assert_eq!(config.rootfs, PathBuf::from("/other"));
        assert_eq!(config.limits.pids_max, Some(10));
        assert!(config.network.is_none());
    }

    #[test]
    fn network_flag_restores_network_disabled_by_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"network": null}}"#).unwrap();
        let path = file.path().to_str().unwrap();

        let config = parse(&["--config", path, "--ip", "10.0.0.9/24"])
            .to_run_config()
            .unwrap();
        assert_eq!(config.network.unwrap().address, "10.0.0.9/24");
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let err = parse(&["--config", "/nonexistent/nsrun.json"])
            .to_run_config()
            .unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/nsrun.json"));
    }

    #[test]
    fn log_format_accepts_json() {
        assert_eq!(parse(&["--log-format", "json"]).log_format, LogFormat::Json);
    }
}
