//! Unified error types for the nsrun workspace.
//!
//! Each variant names one failure class of the launch pipeline. The
//! runtime crate pairs these with a failure category to pick the exit
//! status; this crate only describes what went wrong.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum NsrunError {
    /// Memory or another finite resource could not be reserved.
    #[error("allocation failed: {message}")]
    Allocation {
        /// What was being allocated.
        message: String,
    },

    /// An input was empty, malformed, or failed validation.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the rejected input.
        message: String,
    },

    /// A cgroup or network device could not be created.
    #[error("failed to create {resource}: {reason}")]
    ResourceCreation {
        /// Kind and name of the resource, e.g. `bridge nsrun-br0`.
        resource: String,
        /// Underlying cause.
        reason: String,
    },

    /// A process could not be bound into a cgroup or namespace.
    #[error("failed to attach {target}: {reason}")]
    Attach {
        /// What was being attached where.
        target: String,
        /// Underlying cause.
        reason: String,
    },

    /// Process creation failed at the kernel boundary.
    #[error("launch failed: {message}")]
    Launch {
        /// Description of the failure.
        message: String,
    },

    /// A step of the in-namespace entry sequence failed.
    #[error("in-namespace step '{step}' failed: {reason}")]
    InNamespace {
        /// Name of the entry-sequence step.
        step: &'static str,
        /// Underlying cause.
        reason: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// An external command exited unsuccessfully.
    #[error("command `{command}` failed with {}", exit_description(.code))]
    Command {
        /// Rendered command line.
        command: String,
        /// Exit code, if the command exited normally.
        code: Option<i32>,
    },

    /// The operation needs a Linux host.
    #[error("unsupported platform: {message}")]
    Unsupported {
        /// Description of the unavailable facility.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl NsrunError {
    /// Shorthand for an [`NsrunError::InvalidArgument`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Returns whether this error stems from rejected input rather than
    /// a failed system operation.
    #[must_use]
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }
}

#[allow(clippy::ref_option)]
fn exit_description(code: &Option<i32>) -> String {
    code.map_or_else(|| "no exit code (terminated by signal)".into(), |c| format!("exit code {c}"))
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, NsrunError>;
