//! Human-readable rendering of a run configuration.

use nsrun_common::config::RunConfig;
use nsrun_common::types::ResourceLimits;

/// Formats a byte count into a human-readable string (e.g., "128.0 MiB").
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Renders the configured limits, e.g. `memory=256.0 MiB cpu=50000/100000 pids=64`.
#[must_use]
pub fn describe_limits(limits: &ResourceLimits) -> String {
    let limits = limits.effective();
    let mut parts = Vec::new();
    if let Some(bytes) = limits.memory_bytes {
        parts.push(format!("memory={}", format_bytes(bytes)));
    }
    if let Some(cpu) = limits.cpu {
        parts.push(format!("cpu={}/{}", cpu.quota_us, cpu.period_us));
    }
    if let Some(pids) = limits.pids_max {
        parts.push(format!("pids={pids}"));
    }
    if parts.is_empty() {
        return "unlimited".into();
    }
    parts.join(" ")
}

/// One-line summary of what is about to be launched.
#[must_use]
pub fn describe_run(config: &RunConfig) -> String {
    let network = config.network.as_ref().map_or_else(
        || "none".to_string(),
        |n| format!("{} via {}", n.address, n.bridge),
    );
    format!(
        "{} in {} [{}] network={network}",
        config.command,
        config.rootfs.display(),
        describe_limits(&config.limits)
    )
}
