//! Error taxonomy for platform adapters.
//!
//! [`PlatformError`] is what every adapter operation returns on failure.
//! "Not found" is deliberately absent: a missing project or issue is a
//! normal empty result (`Ok(vec![])` / `Ok(None)`), never an error.
//!
//! | Variant | Raised when | Federated search |
//! |---------|-------------|------------------|
//! | `SourceUnavailable` | transport failure, timeout, non-2xx other than 404 | isolated per target |
//! | `MalformedResponse` | response JSON does not match the adapter's schema | isolated per target |
//! | `UnknownInstance` | Bugzilla instance name is not configured | isolated per target |
//! | `UnknownPlatform` | no adapter is registered under the name | aborts before dispatch |

use thiserror::Error;

/// Failures surfaced by adapters and the platform registry.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The remote tracker could not be reached or answered with an error status.
    #[error("{platform} is unavailable: {message}")]
    SourceUnavailable {
        /// Adapter name (e.g. `"github"`, `"bugzilla-mozilla"`).
        platform: String,
        /// Underlying transport or status description.
        message: String,
    },

    /// The tracker answered, but not in a shape the adapter can parse.
    #[error("{platform} returned a malformed response: {message}")]
    MalformedResponse {
        /// Adapter name.
        platform: String,
        /// Parse failure description.
        message: String,
    },

    /// No adapter is registered under this platform name.
    #[error("Unknown platform: {name}. Available: {}", known.join(", "))]
    UnknownPlatform {
        /// The name the caller asked for.
        name: String,
        /// Every registered platform name.
        known: Vec<String>,
    },

    /// A Bugzilla instance name that is neither configured nor a URL.
    #[error("Unknown Bugzilla instance: {name}. Available: {}", known.join(", "))]
    UnknownInstance {
        /// The instance the caller asked for.
        name: String,
        /// Every configured instance name.
        known: Vec<String>,
    },
}

impl PlatformError {
    /// Build a [`PlatformError::SourceUnavailable`].
    pub fn unavailable(platform: impl Into<String>, message: impl ToString) -> Self {
        Self::SourceUnavailable {
            platform: platform.into(),
            message: message.to_string(),
        }
    }

    /// Build a [`PlatformError::MalformedResponse`].
    pub fn malformed(platform: impl Into<String>, message: impl ToString) -> Self {
        Self::MalformedResponse {
            platform: platform.into(),
            message: message.to_string(),
        }
    }

    /// True for failures of the remote source itself.
    ///
    /// Malformed responses count as unavailable: callers treat both the same.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. } | Self::MalformedResponse { .. }
        )
    }
}
