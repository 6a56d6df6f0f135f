//! Logging setup shared by the toolbridge binaries.
//!
//! Every subscriber installed here writes to **stderr**. Stdio providers use
//! stdout as their message channel, so a single stray log line there would
//! corrupt the framing.

#![warn(missing_docs, clippy::pedantic)]

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Subscriber options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    directive: String,
    with_target: bool,
    ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            directive: DEFAULT_DIRECTIVE.to_owned(),
            with_target: true,
            ansi: false,
        }
    }
}

impl TelemetryConfig {
    /// Sets the filter directive applied when `RUST_LOG` is absent.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directive = directive.into();
        self
    }

    /// Includes or omits the event target in each line.
    #[must_use]
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    /// Enables ANSI colours.
    #[must_use]
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.ansi = enabled;
        self
    }

    /// Fallback filter directive.
    #[must_use]
    pub fn directive(&self) -> &str {
        &self.directive
    }

    fn filter(&self) -> Result<EnvFilter, TelemetryError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.directive).map_err(|err| TelemetryError::InvalidDirective {
            directive: self.directive.clone(),
            reason: err.to_string(),
        })
    }
}

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The fallback directive could not be parsed.
    #[error("invalid log directive `{directive}`: {reason}")]
    InvalidDirective {
        /// Offending directive.
        directive: String,
        /// Parser message.
        reason: String,
    },

    /// A global subscriber was already installed.
    #[error("a global tracing subscriber is already installed: {reason}")]
    AlreadyInstalled {
        /// Underlying message.
        reason: String,
    },
}

/// Installs the global fmt subscriber writing to stderr.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidDirective`] for a bad fallback directive
/// and [`TelemetryError::AlreadyInstalled`] when called twice.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    tracing_subscriber::fmt()
        .with_env_filter(config.filter()?)
        .with_target(config.with_target)
        .with_ansi(config.ansi)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| TelemetryError::AlreadyInstalled {
            reason: err.to_string(),
        })
}
