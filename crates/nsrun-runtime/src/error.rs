//! Launch failures and the exit status each one maps to.

use std::fmt;

use nsrun_common::error::NsrunError;
use thiserror::Error;

/// Category of a failed launch. Each category has its own fixed exit
/// status so callers can tell failures apart without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    /// Rejected configuration, name, or address.
    InvalidArgument,
    /// The namespace descriptor could not be set up or registered.
    Namespace,
    /// The cgroup could not be created or limited.
    Cgroup,
    /// Host-side network provisioning failed.
    Network,
    /// Process creation, the entry sequence, or the wait failed.
    Launch,
    /// The process could not be bound to its cgroup or namespace.
    Attach,
    /// The launch was cancelled.
    Cancelled,
}

impl FailureCategory {
    /// Exit status reported for this category.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::InvalidArgument => 120,
            Self::Namespace => 121,
            Self::Cgroup => 122,
            Self::Network => 123,
            Self::Launch => 124,
            Self::Attach => 125,
            Self::Cancelled => 130,
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::Namespace => write!(f, "namespace"),
            Self::Cgroup => write!(f, "cgroup"),
            Self::Network => write!(f, "network"),
            Self::Launch => write!(f, "process creation"),
            Self::Attach => write!(f, "attach"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A fatal launch failure: what failed and at which stage.
#[derive(Debug, Error)]
#[error("{category}: {source}")]
pub struct RunError {
    /// Stage category that determines the exit status.
    pub category: FailureCategory,
    /// Underlying cause.
    #[source]
    pub source: NsrunError,
}

impl RunError {
    /// Wraps `source` as a failure of `category`.
    ///
    /// Rejected input is always reported as [`FailureCategory::InvalidArgument`],
    /// whichever stage rejected it.
    #[must_use]
    pub fn new(category: FailureCategory, source: NsrunError) -> Self {
        let category = if source.is_invalid_argument() {
            FailureCategory::InvalidArgument
        } else {
            category
        };
        Self { category, source }
    }

    /// A launch that was cancelled before the container finished.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(
            FailureCategory::Cancelled,
            NsrunError::Launch {
                message: "launch cancelled".into(),
            },
        )
    }

    /// Exit status for this failure.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.category.exit_code()
    }
}

/// Returns a closure that tags an error with `category`, for `map_err`.
pub(crate) fn at(category: FailureCategory) -> impl Fn(NsrunError) -> RunError {
    move |source| RunError::new(category, source)
}
