//! Configuration parsing and validation for llm-relay.
//!
//! Every field has a default, so the relay runs without a config file. The
//! values are resolved once at startup (file, then environment) and shared
//! read-only afterwards.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding the listen port.
pub const PORT_ENV: &str = "PORT";
/// Environment variable overriding the Ollama base URL.
pub const OLLAMA_URL_ENV: &str = "OLLAMA_URL";
/// Environment variable holding the fallback Gemini API key.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub replicate: ReplicateConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub sensay: SensayConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "0.0.0.0:3000")
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "0.0.0.0:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Replicate predictions API.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicateConfig {
    /// Predictions endpoint
    #[serde(default = "default_replicate_url")]
    pub url: String,
    /// Per-call timeout in seconds
    #[serde(default = "default_replicate_timeout")]
    pub timeout_secs: u64,
}

fn default_replicate_url() -> String {
    "https://api.replicate.com/v1/predictions".to_string()
}

fn default_replicate_timeout() -> u64 {
    30
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            url: default_replicate_url(),
            timeout_secs: default_replicate_timeout(),
        }
    }
}

impl ReplicateConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Gemini generative language API.
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    /// API base, without the `/models/...` suffix
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    /// Model used when the request does not name one
    #[serde(default = "default_gemini_model")]
    pub default_model: String,
    /// Server-side key used when the caller sends no `X-Gemini-API-Key`.
    /// May contain `${VAR}` references.
    pub api_key: Option<ApiKey>,
    /// Where `api_key` came from, filled in by [`Config::apply_env_with`].
    #[serde(skip)]
    pub key_source: KeySource,
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: default_gemini_base_url(),
            default_model: default_gemini_model(),
            api_key: None,
            key_source: KeySource::None,
        }
    }
}

/// Local Ollama daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaConfig {
    /// Daemon base URL
    #[serde(default = "default_ollama_url")]
    pub url: String,
    /// Model used when the request does not name one
    #[serde(default = "default_ollama_model")]
    pub default_model: String,
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3".to_string()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: default_ollama_url(),
            default_model: default_ollama_model(),
        }
    }
}

/// Sensay replica chat API.
#[derive(Debug, Clone, Deserialize)]
pub struct SensayConfig {
    /// API base URL
    #[serde(default = "default_sensay_url")]
    pub base_url: String,
    /// Sent as `X-API-Version`
    #[serde(default = "default_sensay_api_version")]
    pub api_version: String,
    /// User id used when the request has no `X-User-ID` header
    #[serde(default = "default_sensay_user_id")]
    pub default_user_id: String,
}

fn default_sensay_url() -> String {
    "https://api.sensay.io".to_string()
}

fn default_sensay_api_version() -> String {
    "2025-03-25".to_string()
}

fn default_sensay_user_id() -> String {
    "sample-user".to_string()
}

impl Default for SensayConfig {
    fn default() -> Self {
        Self {
            base_url: default_sensay_url(),
            api_version: default_sensay_api_version(),
            default_user_id: default_sensay_user_id(),
        }
    }
}

/// Retry budget for the Replicate and Gemini function-calling endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff before retry `n` is `2^n` units
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_unit_ms() -> u64 {
    1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_unit_ms: default_backoff_unit_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// API key wrapper that redacts in Debug/Display and zeroizes on drop.
///
/// Only accessible via `.expose_secret()`, so every use is grep-auditable.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }

    /// First four characters followed by `...`, for log lines.
    pub fn masked(&self) -> String {
        let prefix: String = self.expose_secret().chars().take(4).collect();
        format!("{}...", prefix)
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<'de> serde::Deserialize<'de> for ApiKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|s| ApiKey(SecretString::from(s)))
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        ApiKey(SecretString::from(s))
    }
}

/// How the server-side Gemini key was resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum KeySource {
    /// Literal string in the config file
    Literal,
    /// Config value with `${VAR}` references expanded
    EnvExpanded,
    /// Read from `GEMINI_API_KEY`
    Environment,
    /// No server-side key; callers must send the header
    #[default]
    None,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Literal => write!(f, "config-literal"),
            KeySource::EnvExpanded => write!(f, "env-expanded"),
            KeySource::Environment => write!(f, "environment ({})", GEMINI_API_KEY_ENV),
            KeySource::None => write!(f, "none"),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file. Environment overrides are not applied.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::parse_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the runtime configuration: the file if given (defaults otherwise),
    /// then `PORT`, `OLLAMA_URL` and `GEMINI_API_KEY` from the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_with(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using a custom lookup function.
    ///
    /// The closure keeps this testable without touching global env state.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup(PORT_ENV) {
            let port: u16 = port.trim().parse().map_err(|_| ConfigError::EnvVar {
                var: PORT_ENV.to_string(),
                field: "server.listen".to_string(),
                message: format!("'{}' is not a valid port number", port),
            })?;
            self.server.listen = replace_port(&self.server.listen, port);
        }

        if let Some(url) = lookup(OLLAMA_URL_ENV).filter(|u| !u.trim().is_empty()) {
            self.ollama.url = url;
        }

        let (api_key, source) = match self.gemini.api_key.take() {
            Some(key) if key.expose_secret().contains("${") => {
                let expanded = expand_env_vars_with(key.expose_secret(), "gemini.api_key", &lookup)?;
                (Some(ApiKey::from(expanded)), KeySource::EnvExpanded)
            }
            Some(key) => (Some(key), KeySource::Literal),
            None => match lookup(GEMINI_API_KEY_ENV).filter(|k| !k.is_empty()) {
                Some(value) => (Some(ApiKey::from(value)), KeySource::Environment),
                None => (None, KeySource::None),
            },
        };
        self.gemini.api_key = api_key;
        self.gemini.key_source = source;

        Ok(())
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.listen.trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.listen must not be empty".to_string(),
            ));
        }

        for (field, url) in [
            ("replicate.url", &self.replicate.url),
            ("gemini.base_url", &self.gemini.base_url),
            ("ollama.url", &self.ollama.url),
            ("sensay.base_url", &self.sensay.base_url),
        ] {
            if url.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{} must not be empty", field)));
            }
        }

        if self.replicate.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "replicate.timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable '{var}' invalid for '{field}': {message}")]
    EnvVar {
        var: String,
        field: String,
        message: String,
    },
}

/// Swap the port of a `host:port` listen address.
fn replace_port(listen: &str, port: u16) -> String {
    match listen.rsplit_once(':') {
        Some((host, _)) => format!("{}:{}", host, port),
        None => format!("{}:{}", listen, port),
    }
}

/// Expand all `${VAR}` references in a string using a custom lookup function.
///
/// Supports multiple references in one string. Fails on the first missing
/// variable, unclosed `${`, or empty variable name.
fn expand_env_vars_with<F>(input: &str, field: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let end = after.find('}').ok_or_else(|| ConfigError::EnvVar {
            var: "<unclosed>".to_string(),
            field: field.to_string(),
            message: "Unclosed '${' reference".to_string(),
        })?;

        let var_name = &after[..end];
        if var_name.is_empty() {
            return Err(ConfigError::EnvVar {
                var: "".to_string(),
                field: field.to_string(),
                message: "Empty variable name in '${}' reference".to_string(),
            });
        }

        let value = lookup(var_name).ok_or_else(|| ConfigError::EnvVar {
            var: var_name.to_string(),
            field: field.to_string(),
            message: "variable is not set".to_string(),
        })?;

        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_file() {
        let config = Config::default();
        assert_eq!(config.server.listen, "0.0.0.0:3000");
        assert_eq!(config.replicate.url, "https://api.replicate.com/v1/predictions");
        assert_eq!(config.replicate.timeout(), Duration::from_secs(30));
        assert_eq!(config.gemini.default_model, "gemini-2.0-flash");
        assert_eq!(config.ollama.url, "http://localhost:11434");
        assert_eq!(config.ollama.default_model, "llama3");
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.backoff_unit_ms, 1000);
        assert!(config.gemini.api_key.is_none());
        assert_eq!(config.sensay.base_url, "https://api.sensay.io");
        assert_eq!(config.sensay.api_version, "2025-03-25");
        assert_eq!(config.sensay.default_user_id, "sample-user");
    }

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let config = Config::parse_str("").unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:3000");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [server]
            listen = "127.0.0.1:9000"

            [replicate]
            url = "http://replicate.test/v1/predictions"
            timeout_secs = 5

            [gemini]
            base_url = "http://gemini.test/v1beta"
            default_model = "gemini-1.5-pro"
            api_key = "literal-key"

            [ollama]
            url = "http://ollama.test:11434"
            default_model = "mistral"

            [sensay]
            base_url = "http://sensay.test"
            default_user_id = "relay-user"

            [retry]
            max_retries = 4
            backoff_unit_ms = 10

            [logging]
            level = "debug"
        "#;

        let config = Config::parse_str(toml).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9000");
        assert_eq!(config.replicate.timeout_secs, 5);
        assert_eq!(config.gemini.default_model, "gemini-1.5-pro");
        assert_eq!(
            config.gemini.api_key.as_ref().unwrap().expose_secret(),
            "literal-key"
        );
        assert_eq!(config.ollama.default_model, "mistral");
        assert_eq!(config.sensay.base_url, "http://sensay.test");
        assert_eq!(config.sensay.default_user_id, "relay-user");
        assert_eq!(config.sensay.api_version, "2025-03-25");
        assert_eq!(config.retry.max_retries, 4);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validation_rejects_empty_url() {
        let toml = r#"
            [ollama]
            url = ""
        "#;
        let err = Config::parse_str(toml).unwrap_err();
        assert!(err.to_string().contains("ollama.url"));
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let toml = r#"
            [replicate]
            timeout_secs = 0
        "#;
        assert!(matches!(
            Config::parse_str(toml),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_port_env_overrides_listen_port() {
        let mut config = Config::default();
        config.apply_env_with(env(&[("PORT", "8081")])).unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:8081");
    }

    #[test]
    fn test_invalid_port_env_errors() {
        let mut config = Config::default();
        let err = config.apply_env_with(env(&[("PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_ollama_url_env_override() {
        let mut config = Config::default();
        config
            .apply_env_with(env(&[("OLLAMA_URL", "http://gpu-box:11434")]))
            .unwrap();
        assert_eq!(config.ollama.url, "http://gpu-box:11434");
    }

    #[test]
    fn test_gemini_key_from_environment() {
        let mut config = Config::default();
        config
            .apply_env_with(env(&[("GEMINI_API_KEY", "env-key")]))
            .unwrap();
        assert_eq!(
            config.gemini.api_key.as_ref().unwrap().expose_secret(),
            "env-key"
        );
        assert_eq!(config.gemini.key_source, KeySource::Environment);
    }

    #[test]
    fn test_literal_gemini_key_wins_over_environment() {
        let mut config = Config::parse_str("[gemini]\napi_key = \"file-key\"").unwrap();
        config
            .apply_env_with(env(&[("GEMINI_API_KEY", "env-key")]))
            .unwrap();
        assert_eq!(
            config.gemini.api_key.as_ref().unwrap().expose_secret(),
            "file-key"
        );
        assert_eq!(config.gemini.key_source, KeySource::Literal);
    }

    #[test]
    fn test_gemini_key_reference_expanded() {
        let mut config = Config::parse_str("[gemini]\napi_key = \"${MY_KEY}\"").unwrap();
        config.apply_env_with(env(&[("MY_KEY", "expanded")])).unwrap();
        assert_eq!(
            config.gemini.api_key.as_ref().unwrap().expose_secret(),
            "expanded"
        );
        assert_eq!(config.gemini.key_source, KeySource::EnvExpanded);
    }

    #[test]
    fn test_gemini_key_reference_missing_var_errors() {
        let mut config = Config::parse_str("[gemini]\napi_key = \"${NOPE}\"").unwrap();
        let err = config.apply_env_with(env(&[])).unwrap_err();
        match err {
            ConfigError::EnvVar { var, field, .. } => {
                assert_eq!(var, "NOPE");
                assert_eq!(field, "gemini.api_key");
            }
            other => panic!("expected EnvVar error, got {:?}", other),
        }
    }

    #[test]
    fn test_no_gemini_key_anywhere() {
        let mut config = Config::default();
        config.apply_env_with(env(&[])).unwrap();
        assert!(config.gemini.api_key.is_none());
        assert_eq!(config.gemini.key_source, KeySource::None);
    }

    #[test]
    fn test_expand_multiple_references() {
        let lookup = env(&[("A", "one"), ("B", "two")]);
        let out = expand_env_vars_with("${A}-${B}", "field", lookup).unwrap();
        assert_eq!(out, "one-two");
    }

    #[test]
    fn test_expand_unclosed_reference_errors() {
        let err = expand_env_vars_with("${A", "field", env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::EnvVar { ref var, .. } if var == "<unclosed>"));
    }

    #[test]
    fn test_api_key_debug_redaction() {
        let key = ApiKey::from("super-secret-gemini-key");
        assert_eq!(format!("{:?}", key), "[REDACTED]");
        assert_eq!(format!("{}", key), "[REDACTED]");
        assert_eq!(key.masked(), "supe...");
    }

    #[test]
    fn test_replace_port_without_port() {
        assert_eq!(replace_port("localhost", 4000), "localhost:4000");
        assert_eq!(replace_port("[::1]:3000", 4000), "[::1]:4000");
    }
}
