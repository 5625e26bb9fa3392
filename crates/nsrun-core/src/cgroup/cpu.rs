//! CPU resource control.
//!
//! The legacy hierarchy takes period and quota in separate files; the
//! quota is interpreted against whatever period is configured when it is
//! written, so the period always goes first. The unified hierarchy takes
//! both in one `cpu.max` write.

use nsrun_common::types::CpuLimit;

use super::{CgroupVersion, ControlWrite};

/// Returns the writes that enforce `cpu`, period before quota.
#[must_use]
pub fn cpu_bandwidth(version: CgroupVersion, cpu: CpuLimit) -> Vec<ControlWrite> {
    match version {
        CgroupVersion::V1 => vec![
            ControlWrite::new("cpu.cfs_period_us", cpu.period_us.to_string()),
            ControlWrite::new("cpu.cfs_quota_us", cpu.quota_us.to_string()),
        ],
        CgroupVersion::V2 => vec![ControlWrite::new(
            "cpu.max",
            format!("{} {}", cpu.quota_us, cpu.period_us),
        )],
    }
}
