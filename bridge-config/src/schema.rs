//! Typed configuration document.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use bridge_adapters::openai::{DEFAULT_MODEL, OpenAiConfig};
use bridge_adapters::{
    CompletionSettings, DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_SYSTEM_PROMPT, DEFAULT_TEMPERATURE,
};
use bridge_session::protocol::LATEST_PROTOCOL_VERSION;
use bridge_session::{HttpEndpoint, ProviderEndpoint, SessionConfig, StdioEndpoint, SubProtocol};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Root of a configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Providers keyed by the name used in logs and collision reports.
    pub providers: BTreeMap<String, ProviderConfig>,
    /// Language model settings.
    #[serde(default)]
    pub model: ModelConfig,
    /// Provider session settings.
    #[serde(default)]
    pub session: SessionSettings,
}

/// How to reach one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case", deny_unknown_fields)]
pub enum ProviderConfig {
    /// Spawned child process speaking over stdin/stdout.
    Stdio {
        /// Program to run.
        command: String,
        /// Program arguments.
        #[serde(default)]
        args: Vec<String>,
        /// Extra environment variables.
        #[serde(default)]
        env: BTreeMap<String, String>,
        /// Working directory.
        #[serde(default)]
        cwd: Option<PathBuf>,
    },
    /// Network provider with JSON or event-stream responses.
    StreamableHttp {
        /// Endpoint URL.
        url: String,
        /// Extra request headers.
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
    /// Network provider with plain JSON request/response.
    Http {
        /// Endpoint URL.
        url: String,
        /// Extra request headers.
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
}

impl ProviderConfig {
    /// Converts to a session endpoint.
    #[must_use]
    pub fn endpoint(&self) -> ProviderEndpoint {
        match self {
            Self::Stdio {
                command,
                args,
                env,
                cwd,
            } => {
                let mut endpoint = StdioEndpoint::new(command).args(args);
                for (key, value) in env {
                    endpoint = endpoint.env(key, value);
                }
                if let Some(cwd) = cwd {
                    endpoint = endpoint.cwd(cwd);
                }
                endpoint.into()
            }
            Self::StreamableHttp { url, headers } => {
                http_endpoint(url, headers, SubProtocol::StreamableHttp)
            }
            Self::Http { url, headers } => http_endpoint(url, headers, SubProtocol::Http),
        }
    }

    fn validate(&self, name: &str) -> ConfigResult<()> {
        match self {
            Self::Stdio { command, .. } if command.trim().is_empty() => Err(ConfigError::invalid(
                format!("providers.{name}.command"),
                "command cannot be empty",
            )),
            Self::StreamableHttp { url, .. } | Self::Http { url, .. }
                if !(url.starts_with("http://") || url.starts_with("https://")) =>
            {
                Err(ConfigError::invalid(
                    format!("providers.{name}.url"),
                    "URL must start with http:// or https://",
                ))
            }
            _ => Ok(()),
        }
    }
}

fn http_endpoint(
    url: &str,
    headers: &BTreeMap<String, String>,
    protocol: SubProtocol,
) -> ProviderEndpoint {
    let mut endpoint = HttpEndpoint::new(url).sub_protocol(protocol);
    for (name, value) in headers {
        endpoint = endpoint.header(name, value);
    }
    endpoint.into()
}

/// Language model section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Model identifier.
    pub model: String,
    /// OpenAI-compatible base URL; the `OpenAI` API when absent.
    pub base_url: Option<String>,
    /// Name handed to the key lookup.
    pub api_key_env: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Output token budget.
    pub max_output_tokens: u32,
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    /// System prompt sent with every request.
    pub system_prompt: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_owned(),
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_owned(),
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            timeout_secs: 60,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
        }
    }
}

impl ModelConfig {
    /// Settings applied to every completion.
    #[must_use]
    pub fn completion_settings(&self) -> CompletionSettings {
        CompletionSettings {
            system_prompt: self.system_prompt.clone(),
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        }
    }

    /// Adapter configuration with the API key resolved through `lookup`.
    ///
    /// `lookup` receives [`ModelConfig::api_key_env`]; callers decide where
    /// keys come from.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingApiKey`] when `lookup` yields nothing
    /// usable, or [`ConfigError::Adapter`] for an invalid base URL.
    pub fn adapter_config<F>(&self, lookup: F) -> ConfigResult<OpenAiConfig>
    where
        F: FnOnce(&str) -> Option<String>,
    {
        let api_key = lookup(&self.api_key_env)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey {
                variable: self.api_key_env.clone(),
            })?;

        let mut config = OpenAiConfig::new(&self.model)
            .with_api_key(api_key)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_default_temperature(self.temperature)
            .with_default_max_tokens(self.max_output_tokens);
        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url)?;
        }
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::invalid("model.model", "model cannot be empty"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::invalid(
                "model.temperature",
                "temperature must be between 0 and 2",
            ));
        }
        if self.max_output_tokens == 0 {
            return Err(ConfigError::invalid(
                "model.max_output_tokens",
                "token budget must be positive",
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "model.timeout_secs",
                "timeout must be positive",
            ));
        }
        Ok(())
    }
}

/// Session section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSettings {
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Protocol revision requested at the handshake.
    pub protocol_version: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            protocol_version: LATEST_PROTOCOL_VERSION.to_owned(),
        }
    }
}

impl SessionSettings {
    /// Session configuration for discovery and dispatch.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::default()
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_protocol_version(&self.protocol_version)
    }
}

impl BridgeConfig {
    /// Checks every section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoProviders`] for an empty provider map and
    /// [`ConfigError::Invalid`] naming the first unusable field.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.providers.is_empty() {
            return Err(ConfigError::NoProviders);
        }
        for (name, provider) in &self.providers {
            if name.trim().is_empty() {
                return Err(ConfigError::invalid("providers", "provider names cannot be empty"));
            }
            provider.validate(name)?;
        }
        self.model.validate()?;
        if self.session.request_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "session.request_timeout_secs",
                "timeout must be positive",
            ));
        }
        Ok(())
    }

    /// Provider endpoints in name order.
    #[must_use]
    pub fn endpoints(&self) -> Vec<(String, ProviderEndpoint)> {
        self.providers
            .iter()
            .map(|(name, provider)| (name.clone(), provider.endpoint()))
            .collect()
    }
}
