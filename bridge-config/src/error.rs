use std::path::PathBuf;

use bridge_adapters::AdapterError;
use thiserror::Error;

/// Result alias for configuration handling.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or applying configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File that was requested.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid configuration JSON.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field holds an unusable value.
    #[error("invalid `{field}`: {reason}")]
    Invalid {
        /// Dotted path of the field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// No providers are configured.
    #[error("config declares no providers")]
    NoProviders,

    /// The API key lookup found nothing.
    #[error("API key variable `{variable}` is not set")]
    MissingApiKey {
        /// Name handed to the lookup.
        variable: String,
    },

    /// The model section was rejected by the adapter.
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
