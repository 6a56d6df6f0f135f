//! Configuration for toolbridge.
//!
//! A JSON document lists providers by name, each tagged with its transport,
//! plus optional `model` and `session` sections:
//!
//! ```json
//! {
//!   "providers": {
//!     "math": { "transport": "stdio", "command": "capability-provider", "args": ["--catalog", "math"] },
//!     "weather": { "transport": "streamable_http", "url": "http://localhost:8000/mcp" }
//!   },
//!   "model": { "model": "gpt-4o-mini", "api_key_env": "OPENAI_API_KEY" }
//! }
//! ```
//!
//! API keys never come from the document itself. [`ModelConfig::adapter_config`]
//! asks a caller-supplied lookup for them once.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod schema;

use std::fs;
use std::path::Path;

use tracing::info;

pub use error::{ConfigError, ConfigResult};
pub use schema::{BridgeConfig, ModelConfig, ProviderConfig, SessionSettings};

impl BridgeConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON or unknown fields,
    /// and any validation failure from [`BridgeConfig::validate`].
    pub fn from_json(text: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read, plus
    /// everything [`BridgeConfig::from_json`] reports.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&text)?;
        info!(
            path = %path.display(),
            providers = config.providers.len(),
            model = %config.model.model,
            "loaded configuration"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use bridge_session::{ProviderEndpoint, SubProtocol};

    use super::*;

    const SAMPLE: &str = r#"{
        "providers": {
            "math": {
                "transport": "stdio",
                "command": "capability-provider",
                "args": ["--catalog", "math"],
                "env": {"RUST_LOG": "debug"}
            },
            "weather": {
                "transport": "streamable_http",
                "url": "http://localhost:8000/mcp",
                "headers": {"x-team": "blue"}
            },
            "legacy": {"transport": "http", "url": "https://tools.example.com/rpc"}
        },
        "model": {"model": "llama-3.1-8b-instant", "base_url": "https://api.groq.com/openai", "api_key_env": "GROQ_API_KEY"},
        "session": {"request_timeout_secs": 5}
    }"#;

    fn temp_file(contents: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("bridge-config-{}.json", uuid::Uuid::new_v4()));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn parses_every_transport() {
        let config = BridgeConfig::from_json(SAMPLE).unwrap();
        let endpoints = config.endpoints();
        assert_eq!(
            endpoints.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>(),
            ["legacy", "math", "weather"]
        );

        let ProviderEndpoint::Stdio(math) = &endpoints[1].1 else {
            panic!("math should be stdio");
        };
        assert_eq!(math.command(), "capability-provider");
        assert_eq!(math.arguments(), ["--catalog", "math"]);
        assert_eq!(math.environment()["RUST_LOG"], "debug");

        let ProviderEndpoint::Http(weather) = &endpoints[2].1 else {
            panic!("weather should be http");
        };
        assert_eq!(weather.protocol(), SubProtocol::StreamableHttp);
        assert_eq!(weather.headers()["x-team"], "blue");

        let ProviderEndpoint::Http(legacy) = &endpoints[0].1 else {
            panic!("legacy should be http");
        };
        assert_eq!(legacy.protocol(), SubProtocol::Http);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config = BridgeConfig::from_json(
            r#"{"providers": {"bmi": {"transport": "stdio", "command": "capability-provider"}}}"#,
        )
        .unwrap();

        let settings = config.model.completion_settings();
        assert_eq!(settings.temperature, 0.2);
        assert_eq!(settings.max_output_tokens, 250);
        assert_eq!(config.model.model, "gpt-4o-mini");
        assert_eq!(
            config.session.session_config().request_timeout(),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn session_section_overrides_timeout() {
        let config = BridgeConfig::from_json(SAMPLE).unwrap();
        assert_eq!(
            config.session.session_config().request_timeout(),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn api_key_comes_only_from_the_lookup() {
        let config = BridgeConfig::from_json(SAMPLE).unwrap();

        let err = config.model.adapter_config(|_| None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey { ref variable } if variable == "GROQ_API_KEY"));

        let mut asked = None;
        let adapter = config
            .model
            .adapter_config(|name| {
                asked = Some(name.to_owned());
                Some("gsk-test".to_owned())
            })
            .unwrap();
        assert_eq!(asked.as_deref(), Some("GROQ_API_KEY"));
        assert_eq!(adapter.base_url(), "https://api.groq.com/openai/");
        assert_eq!(adapter.model(), "llama-3.1-8b-instant");
    }

    #[test]
    fn rejects_invalid_documents() {
        assert!(matches!(
            BridgeConfig::from_json(r#"{"providers": {}}"#),
            Err(ConfigError::NoProviders)
        ));
        assert!(matches!(
            BridgeConfig::from_json(r#"{"providers": {"x": {"transport": "carrier-pigeon"}}}"#),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            BridgeConfig::from_json(
                r#"{"providers": {"x": {"transport": "stdio", "command": "p", "argz": []}}}"#
            ),
            Err(ConfigError::Parse(_))
        ));

        let err = BridgeConfig::from_json(
            r#"{"providers": {"web": {"transport": "http", "url": "localhost:8000"}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "providers.web.url"));

        let err = BridgeConfig::from_json(
            r#"{"providers": {"m": {"transport": "stdio", "command": "p"}}, "model": {"temperature": 3.5}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "model.temperature"));
    }

    #[test]
    fn loads_from_disk() {
        let path = temp_file(SAMPLE);
        let config = BridgeConfig::load(&path).unwrap();
        assert_eq!(config.providers.len(), 3);
        fs::remove_file(&path).unwrap();

        let err = BridgeConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
