//! System-wide constants and default values.

/// Cgroup filesystem mount point.
pub const CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Prefix of the per-invocation cgroup directory (`nsrun-<pid>`).
pub const CGROUP_PREFIX: &str = "nsrun";

/// CPU bandwidth period in microseconds. Quotas are expressed against it.
pub const CPU_PERIOD_US: u64 = 100_000;

/// Maximum length of a Linux network interface name (`IFNAMSIZ - 1`).
pub const MAX_IFNAME_LEN: usize = 15;

/// Size of the stack handed to each cloned container process.
pub const CHILD_STACK_SIZE: usize = 1024 * 1024;

/// Default logical name of the namespace descriptor.
pub const DEFAULT_NAME: &str = "container-ns";

/// Default root filesystem path.
pub const DEFAULT_ROOTFS: &str = "./rootfs";

/// Default command run inside the container.
pub const DEFAULT_COMMAND: &str = "/bin/sh";

/// Default container hostname.
pub const DEFAULT_HOSTNAME: &str = "nsrun-container";

/// Default host bridge shared by all containers.
pub const DEFAULT_BRIDGE: &str = "nsrun-br0";

/// Default host-side veth name.
pub const DEFAULT_HOST_IF: &str = "veth-host";

/// Default container-side veth name.
pub const DEFAULT_CONTAINER_IF: &str = "veth-cont";

/// Default container address in CIDR form.
pub const DEFAULT_ADDRESS: &str = "10.0.0.2/24";

/// Default gateway installed as the container's default route.
pub const DEFAULT_GATEWAY: &str = "10.0.0.1";

/// Application name used in diagnostics.
pub const APP_NAME: &str = "nsrun";
