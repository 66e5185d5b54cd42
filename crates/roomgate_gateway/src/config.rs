//! Gateway configuration.
//!
//! Configuration documents are JSON. Any string value of the form
//! `${VAR}:default` (or `${VAR}`) is replaced by the environment variable
//! `VAR`, falling back to `default`. Replaced values that read `true` or
//! `false` become booleans and numeric values become numbers.

use crate::error::{ConfigError, ConfigResult};
use roomgate_rpc::{BrokerConfig, RequestConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Backend call settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RequestSettings {
    /// Timeout of a single attempt, in milliseconds.
    pub timeout_ms: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Backoff base unit, in milliseconds.
    pub backoff_base_ms: u64,
}

impl RequestSettings {
    /// Converts to the client configuration.
    pub fn to_request_config(&self) -> RequestConfig {
        RequestConfig::new(Duration::from_millis(self.timeout_ms), self.max_retries)
            .with_backoff_base(Duration::from_millis(self.backoff_base_ms))
    }
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_retries: 3,
            backoff_base_ms: 10,
        }
    }
}

/// Where documents are persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// Through the backend `FETCH`/`SAVE` patterns.
    #[default]
    Backend,
    /// In process memory. Documents are lost on restart.
    Memory,
}

/// Collaboration settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CollaborationSettings {
    /// Contribution window, in seconds.
    pub contribution_window_secs: u64,
    /// Document persistence.
    pub storage: StorageKind,
}

impl Default for CollaborationSettings {
    fn default() -> Self {
        Self {
            contribution_window_secs: 600,
            storage: StorageKind::Backend,
        }
    }
}

/// Logging settings, applied by the binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is not set.
    pub level: String,
    /// Emit JSON lines.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

/// Configuration of the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Message broker connection.
    pub broker: BrokerConfig,
    /// Backend call settings.
    pub request: RequestSettings,
    /// Collaboration settings.
    pub collaboration: CollaborationSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
    /// Production mode.
    pub production: bool,
}

impl GatewayConfig {
    /// Parses a JSON document, resolving placeholders with `env`.
    pub fn from_json_str<F>(text: &str, env: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut document: serde_json::Value =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        interpolate(&mut document, &env);
        let config: Self =
            serde_json::from_value(document).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON file, resolving placeholders from the process environment.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text, |name| std::env::var(name).ok())
    }

    /// Checks value ranges.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.request.timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "request.timeoutMs",
                reason: "must be greater than zero".into(),
            });
        }
        if self.collaboration.contribution_window_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "collaboration.contributionWindowSecs",
                reason: "must be greater than zero".into(),
            });
        }
        if self.broker.host.is_empty() {
            return Err(ConfigError::Invalid {
                field: "broker.host",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Sets production mode.
    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    /// Sets the broker connection.
    pub fn with_broker(mut self, broker: BrokerConfig) -> Self {
        self.broker = broker;
        self
    }

    /// Sets the per-attempt timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the retry count.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.request.max_retries = max_retries;
        self
    }

    /// Sets the document persistence.
    pub fn with_storage(mut self, storage: StorageKind) -> Self {
        self.collaboration.storage = storage;
        self
    }

    /// Sets the contribution window.
    pub fn with_contribution_window(mut self, window: Duration) -> Self {
        self.collaboration.contribution_window_secs = window.as_secs();
        self
    }

    /// Client configuration for backend calls.
    pub fn request_config(&self) -> RequestConfig {
        self.request.to_request_config()
    }

    /// Contribution window.
    pub fn contribution_window(&self) -> Duration {
        Duration::from_secs(self.collaboration.contribution_window_secs)
    }

    /// Heartbeat to negotiate with the broker.
    pub fn heartbeat(&self) -> u32 {
        self.broker.effective_heartbeat(self.production)
    }

    /// Copy safe to print: the broker password is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.broker.password.is_empty() {
            copy.broker.password = "***".into();
        }
        copy
    }
}

fn interpolate<F>(value: &mut serde_json::Value, env: &F)
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        serde_json::Value::String(text) => {
            if let Some(resolved) = resolve_placeholder(text, env) {
                *value = coerce(resolved);
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(|v| interpolate(v, env)),
        serde_json::Value::Object(map) => map.values_mut().for_each(|v| interpolate(v, env)),
        _ => {}
    }
}

/// Resolves `${VAR}:default` or `${VAR}`. Returns `None` for plain strings.
fn resolve_placeholder<F>(text: &str, env: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let rest = text.strip_prefix("${")?;
    let end = rest.find('}')?;
    let name = &rest[..end];
    let default = match &rest[end + 1..] {
        "" => "",
        tail => tail.strip_prefix(':')?,
    };
    if name.is_empty() {
        return None;
    }
    Some(env(name).unwrap_or_else(|| default.to_string()))
}

fn coerce(text: String) -> serde_json::Value {
    match text.as_str() {
        "true" => return serde_json::Value::Bool(true),
        "false" => return serde_json::Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = text.parse::<u64>() {
        return n.into();
    }
    if let Ok(n) = text.parse::<i64>() {
        return n.into();
    }
    match text.parse::<f64>() {
        Ok(n) if n.is_finite() => serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::String(text)),
        _ => serde_json::Value::String(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let config = GatewayConfig::from_json_str("{}", env(&[])).unwrap();
        assert_eq!(config.request.timeout_ms, 10_000);
        assert_eq!(config.request.max_retries, 3);
        assert_eq!(config.contribution_window(), Duration::from_secs(600));
        assert_eq!(config.broker.port, 5672);
        assert_eq!(config.broker.queue, "collaboration-document-service");
        assert_eq!(config.collaboration.storage, StorageKind::Backend);
        assert!(!config.production);
        assert_eq!(config.heartbeat(), 90);
    }

    #[test]
    fn placeholders_resolve_from_env() {
        let text = r#"{
            "broker": {"host": "${RABBITMQ_HOST}:localhost", "port": "${RABBITMQ_PORT}:5672"},
            "request": {"timeoutMs": "${TIMEOUT}:2000"},
            "production": "${PRODUCTION}:false"
        }"#;
        let config = GatewayConfig::from_json_str(
            text,
            env(&[("RABBITMQ_HOST", "mq.internal"), ("PRODUCTION", "true")]),
        )
        .unwrap();

        assert_eq!(config.broker.host, "mq.internal");
        assert_eq!(config.broker.port, 5672);
        assert_eq!(config.request.timeout_ms, 2000);
        assert!(config.production);
        assert_eq!(config.heartbeat(), 30);
    }

    #[test]
    fn placeholder_parsing() {
        let lookup = env(&[("A", "x")]);
        assert_eq!(resolve_placeholder("${A}", &lookup), Some("x".into()));
        assert_eq!(resolve_placeholder("${B}:fallback", &lookup), Some("fallback".into()));
        assert_eq!(resolve_placeholder("${B}", &lookup), Some(String::new()));
        assert_eq!(resolve_placeholder("plain", &lookup), None);
        assert_eq!(resolve_placeholder("${A}suffix", &lookup), None);
        assert_eq!(resolve_placeholder("${}:x", &lookup), None);
    }

    #[test]
    fn coercion() {
        assert_eq!(coerce("true".into()), serde_json::json!(true));
        assert_eq!(coerce("42".into()), serde_json::json!(42));
        assert_eq!(coerce("-1".into()), serde_json::json!(-1));
        assert_eq!(coerce("guest".into()), serde_json::json!("guest"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = GatewayConfig::from_json_str(
            r#"{"collaboration": {"contributionWindowSecs": 0}}"#,
            env(&[]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "collaboration.contributionWindowSecs",
                ..
            }
        ));

        let err = GatewayConfig::from_json_str("not json", env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn builder_and_redaction() {
        let config = GatewayConfig::default()
            .with_production(true)
            .with_request_timeout(Duration::from_millis(750))
            .with_max_retries(1)
            .with_contribution_window(Duration::from_secs(30));

        let request = config.request_config();
        assert_eq!(request.timeout, Duration::from_millis(750));
        assert_eq!(request.max_retries, 1);
        assert_eq!(request.backoff_base, Duration::from_millis(10));
        assert_eq!(config.contribution_window(), Duration::from_secs(30));

        let redacted = config.redacted();
        assert_eq!(redacted.broker.password, "***");
        assert_eq!(config.broker.password, "guest");
    }

    #[test]
    fn from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"request": {{"maxRetries": 5}}}}"#).unwrap();

        let config = GatewayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.request.max_retries, 5);
        assert_eq!(config.request.timeout_ms, 10_000);

        let err = GatewayConfig::from_file(file.path().with_extension("missing")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
