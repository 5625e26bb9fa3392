//! Container launch orchestration for nsrun.
//!
//! [`orchestrator::Orchestrator`] takes a run configuration through
//! namespace, cgroup, and network setup, launches the container process,
//! waits for it, and releases everything it acquired in reverse order.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cancel;
pub mod error;
pub mod orchestrator;
pub mod process;
pub mod registry;
pub mod state;

pub use cancel::CancelHandle;
pub use error::{FailureCategory, RunError};
pub use orchestrator::{Orchestrator, RunOutcome};
