//! Process-count control. Both hierarchies use `pids.max`.

use super::ControlWrite;

/// Returns the write that caps the number of processes in the group.
#[must_use]
pub fn pids_limit(max: u64) -> ControlWrite {
    ControlWrite::new("pids.max", max.to_string())
}
