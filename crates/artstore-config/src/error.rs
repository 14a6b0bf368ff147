//! Structured configuration errors naming the offending variable.

use thiserror::Error;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable was absent.
    #[error("missing environment variable")]
    Missing {
        /// Name of the absent variable.
        name: &'static str,
    },
    /// A variable was present but its value could not be accepted.
    #[error("invalid environment variable")]
    Invalid {
        /// Name of the offending variable.
        name: &'static str,
        /// The rejected value.
        value: String,
        /// Static reason for the rejection.
        reason: &'static str,
    },
}

impl ConfigError {
    pub(crate) const fn missing(name: &'static str) -> Self {
        Self::Missing { name }
    }

    pub(crate) fn invalid(name: &'static str, value: &str, reason: &'static str) -> Self {
        Self::Invalid {
            name,
            value: value.to_string(),
            reason,
        }
    }
}
