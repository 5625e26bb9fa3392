//! Memory resource control.
//!
//! Maps a memory ceiling onto `memory.max` (unified) or
//! `memory.limit_in_bytes` (legacy).

use super::{CgroupVersion, ControlWrite};

/// Returns the write that caps the group's memory at `bytes`.
#[must_use]
pub fn memory_limit(version: CgroupVersion, bytes: u64) -> ControlWrite {
    let file = match version {
        CgroupVersion::V1 => "memory.limit_in_bytes",
        CgroupVersion::V2 => "memory.max",
    };
    ControlWrite::new(file, bytes.to_string())
}
