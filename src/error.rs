//! Error types.
//!
//! The simulation itself never fails: every refusal is a policy decision
//! reported through a boolean or an outcome enum. Only loading the
//! configuration asset can fail.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating a [`MovementConfig`](crate::config::MovementConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read movement config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration text is not valid JSON for the config schema.
    #[error("failed to parse movement config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A parameter is outside of its usable range.
    #[error("invalid movement config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
