//! Unified precedence resolution for configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. Environment variables (`TW_API_BASE`, `TW_STREAM_URL`, ...)
//! 3. config.kdl
//! 4. Built-in defaults
//!
//! Every resolved value remembers where it came from so `tw config show` can
//! explain it.

use std::time::Duration;

use serde::Serialize;

use super::schema::{
    DEFAULT_API_BASE, DEFAULT_BADGE_EXPIRY_MS, DEFAULT_MAX_RECONNECT_ATTEMPTS,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_STREAM_URL, DEFAULT_TOPIC, OutputFormat,
    TicketwatchConfig,
};
use crate::notify::NotificationPermission;
use crate::session::SessionConfig;
use crate::sync::engine::EngineConfig;
use crate::transport::{StreamConfig, StreamProtocol};
use crate::{Error, Result};

pub const API_BASE_ENV: &str = "TW_API_BASE";
pub const STREAM_URL_ENV: &str = "TW_STREAM_URL";
pub const STREAM_PROTOCOL_ENV: &str = "TW_STREAM_PROTOCOL";
pub const TOPIC_ENV: &str = "TW_TOPIC";
pub const NOTIFICATIONS_ENV: &str = "TW_NOTIFICATIONS";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from environment variable
    EnvVar(String),
    /// Value from config.kdl
    ConfigFile,
    /// Value from CLI flag
    CliFlag,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::ConfigFile => write!(f, "config"),
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

impl Serialize for ValueSource {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolved<T> {
    /// The resolved value
    pub value: T,
    /// Where the value came from
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Fully resolved configuration with source tracking.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub api_base: Resolved<String>,
    pub stream_url: Resolved<String>,
    pub stream_protocol: Resolved<StreamProtocol>,
    pub topic: Resolved<String>,
    pub badge_expiry_ms: Resolved<u64>,
    pub notifications: Resolved<NotificationPermission>,
    pub reconnect: Resolved<bool>,
    pub max_reconnect_attempts: Resolved<u32>,
    pub request_timeout_secs: Resolved<u64>,
    pub output_format: Resolved<OutputFormat>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            api_base: Resolved::new(DEFAULT_API_BASE.to_string(), ValueSource::Default),
            stream_url: Resolved::new(DEFAULT_STREAM_URL.to_string(), ValueSource::Default),
            stream_protocol: Resolved::new(StreamProtocol::Stomp, ValueSource::Default),
            topic: Resolved::new(DEFAULT_TOPIC.to_string(), ValueSource::Default),
            badge_expiry_ms: Resolved::new(DEFAULT_BADGE_EXPIRY_MS, ValueSource::Default),
            notifications: Resolved::new(NotificationPermission::Default, ValueSource::Default),
            reconnect: Resolved::new(true, ValueSource::Default),
            max_reconnect_attempts: Resolved::new(
                DEFAULT_MAX_RECONNECT_ATTEMPTS,
                ValueSource::Default,
            ),
            request_timeout_secs: Resolved::new(
                DEFAULT_REQUEST_TIMEOUT_SECS,
                ValueSource::Default,
            ),
            output_format: Resolved::new(OutputFormat::Json, ValueSource::Default),
        }
    }
}

impl ResolvedConfig {
    pub fn output_format(&self) -> OutputFormat {
        self.output_format.value
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.value)
    }

    /// Stream client settings.
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            url: self.stream_url.value.clone(),
            protocol: self.stream_protocol.value,
            topic: self.topic.value.clone(),
            reconnect: self.reconnect.value,
            max_reconnect_attempts: self.max_reconnect_attempts.value,
        }
    }

    /// Everything a [`crate::session::SyncSession`] needs.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            api_base: self.api_base.value.clone(),
            request_timeout: self.request_timeout(),
            stream: self.stream_config(),
            engine: EngineConfig {
                badge_expiry: Duration::from_millis(self.badge_expiry_ms.value),
                permission: self.notifications.value,
            },
        }
    }

    /// `(key, value, source)` rows in config.kdl key order.
    pub fn entries(&self) -> Vec<(&'static str, String, &ValueSource)> {
        vec![
            ("api-base", self.api_base.value.clone(), &self.api_base.source),
            ("stream-url", self.stream_url.value.clone(), &self.stream_url.source),
            (
                "stream-protocol",
                self.stream_protocol.value.to_string(),
                &self.stream_protocol.source,
            ),
            ("topic", self.topic.value.clone(), &self.topic.source),
            (
                "badge-expiry-ms",
                self.badge_expiry_ms.value.to_string(),
                &self.badge_expiry_ms.source,
            ),
            (
                "notifications",
                self.notifications.value.to_string(),
                &self.notifications.source,
            ),
            ("reconnect", self.reconnect.value.to_string(), &self.reconnect.source),
            (
                "max-reconnect-attempts",
                self.max_reconnect_attempts.value.to_string(),
                &self.max_reconnect_attempts.source,
            ),
            (
                "request-timeout-secs",
                self.request_timeout_secs.value.to_string(),
                &self.request_timeout_secs.source,
            ),
            (
                "output-format",
                self.output_format.value.to_string(),
                &self.output_format.source,
            ),
        ]
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_base: Option<String>,
    pub stream_url: Option<String>,
    pub stream_protocol: Option<StreamProtocol>,
    pub topic: Option<String>,
    pub notifications: Option<NotificationPermission>,
    pub badge_expiry_ms: Option<u64>,
    pub output_format: Option<OutputFormat>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = Some(url.into());
        self
    }

    pub fn with_stream_url(mut self, url: impl Into<String>) -> Self {
        self.stream_url = Some(url.into());
        self
    }

    pub fn with_stream_protocol(mut self, protocol: StreamProtocol) -> Self {
        self.stream_protocol = Some(protocol);
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_notifications(mut self, permission: NotificationPermission) -> Self {
        self.notifications = Some(permission);
        self
    }

    pub fn with_badge_expiry_ms(mut self, ms: u64) -> Self {
        self.badge_expiry_ms = Some(ms);
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }
}

/// Resolve configuration against the process environment.
pub fn resolve_config(
    file: &TicketwatchConfig,
    overrides: &ConfigOverrides,
) -> Result<ResolvedConfig> {
    resolve_config_with_env(file, overrides, |name| std::env::var(name).ok())
}

/// Resolve configuration with an explicit environment lookup.
///
/// Empty environment values are treated as unset. An environment value that
/// does not parse is an error rather than a silent fallback.
pub fn resolve_config_with_env(
    file: &TicketwatchConfig,
    overrides: &ConfigOverrides,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    let env = |name: &str| env(name).filter(|v| !v.trim().is_empty());
    let mut result = ResolvedConfig::default();

    resolve_into(
        &mut result.api_base,
        overrides.api_base.clone(),
        env_value(&env, API_BASE_ENV, |v| Some(v.to_string()))?,
        file.api_base.clone(),
    );
    resolve_into(
        &mut result.stream_url,
        overrides.stream_url.clone(),
        env_value(&env, STREAM_URL_ENV, |v| Some(v.to_string()))?,
        file.stream_url.clone(),
    );
    resolve_into(
        &mut result.stream_protocol,
        overrides.stream_protocol,
        env_value(&env, STREAM_PROTOCOL_ENV, StreamProtocol::parse)?,
        file.stream_protocol,
    );
    resolve_into(
        &mut result.topic,
        overrides.topic.clone(),
        env_value(&env, TOPIC_ENV, |v| Some(v.to_string()))?,
        file.topic.clone(),
    );
    resolve_into(
        &mut result.notifications,
        overrides.notifications,
        env_value(&env, NOTIFICATIONS_ENV, NotificationPermission::parse)?,
        file.notifications,
    );
    resolve_into(
        &mut result.badge_expiry_ms,
        overrides.badge_expiry_ms,
        None,
        file.badge_expiry_ms,
    );
    resolve_into(&mut result.reconnect, None, None, file.reconnect);
    resolve_into(
        &mut result.max_reconnect_attempts,
        None,
        None,
        file.max_reconnect_attempts,
    );
    resolve_into(
        &mut result.request_timeout_secs,
        None,
        None,
        file.request_timeout_secs,
    );
    resolve_into(
        &mut result.output_format,
        overrides.output_format,
        None,
        file.output_format,
    );

    // The resolved URLs must still make sense whichever layer they came from
    let effective = TicketwatchConfig {
        api_base: Some(result.api_base.value.clone()),
        stream_url: Some(result.stream_url.value.clone()),
        topic: Some(result.topic.value.clone()),
        badge_expiry_ms: Some(result.badge_expiry_ms.value),
        ..TicketwatchConfig::default()
    };
    effective.validate().map_err(Error::Config)?;

    Ok(result)
}

/// Apply the first present layer to `slot`; leave the default otherwise.
fn resolve_into<T>(
    slot: &mut Resolved<T>,
    cli: Option<T>,
    env: Option<(T, &'static str)>,
    file: Option<T>,
) {
    if let Some(value) = cli {
        *slot = Resolved::new(value, ValueSource::CliFlag);
    } else if let Some((value, name)) = env {
        *slot = Resolved::new(value, ValueSource::EnvVar(name.to_string()));
    } else if let Some(value) = file {
        *slot = Resolved::new(value, ValueSource::ConfigFile);
    }
}

fn env_value<T>(
    env: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<(T, &'static str)>> {
    match env(name) {
        None => Ok(None),
        Some(raw) => parse(raw.trim())
            .map(|value| Some((value, name)))
            .ok_or_else(|| Error::Config(format!("invalid value '{}' in {}", raw, name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn no_env() -> impl Fn(&str) -> Option<String> {
        env_from(&[])
    }

    #[test]
    fn test_defaults() {
        let resolved =
            resolve_config_with_env(&TicketwatchConfig::new(), &ConfigOverrides::new(), no_env())
                .unwrap();
        assert_eq!(resolved.api_base.value, DEFAULT_API_BASE);
        assert_eq!(resolved.api_base.source, ValueSource::Default);
        assert_eq!(resolved.stream_protocol.value, StreamProtocol::Stomp);
        assert_eq!(resolved.badge_expiry_ms.value, 5000);
        assert_eq!(resolved.notifications.value, NotificationPermission::Default);
        assert!(resolved.reconnect.value);
        assert_eq!(resolved.max_reconnect_attempts.value, 10);
        assert_eq!(resolved.output_format(), OutputFormat::Json);
    }

    #[test]
    fn test_file_beats_default() {
        let mut file = TicketwatchConfig::new();
        file.topic = Some("/topic/support".to_string());
        file.reconnect = Some(false);
        let resolved = resolve_config_with_env(&file, &ConfigOverrides::new(), no_env()).unwrap();
        assert_eq!(resolved.topic.value, "/topic/support");
        assert_eq!(resolved.topic.source, ValueSource::ConfigFile);
        assert!(!resolved.reconnect.value);
    }

    #[test]
    fn test_env_beats_file() {
        let mut file = TicketwatchConfig::new();
        file.api_base = Some("http://file:8080/api".to_string());
        let env = env_from(&[(API_BASE_ENV, "http://env:8080/api")]);
        let resolved = resolve_config_with_env(&file, &ConfigOverrides::new(), env).unwrap();
        assert_eq!(resolved.api_base.value, "http://env:8080/api");
        assert_eq!(
            resolved.api_base.source,
            ValueSource::EnvVar(API_BASE_ENV.to_string())
        );
    }

    #[test]
    fn test_cli_beats_env() {
        let env = env_from(&[(STREAM_PROTOCOL_ENV, "stomp")]);
        let overrides = ConfigOverrides::new().with_stream_protocol(StreamProtocol::Json);
        let resolved =
            resolve_config_with_env(&TicketwatchConfig::new(), &overrides, env).unwrap();
        assert_eq!(resolved.stream_protocol.value, StreamProtocol::Json);
        assert_eq!(resolved.stream_protocol.source, ValueSource::CliFlag);
    }

    #[test]
    fn test_empty_env_is_unset() {
        let env = env_from(&[(TOPIC_ENV, "  ")]);
        let resolved =
            resolve_config_with_env(&TicketwatchConfig::new(), &ConfigOverrides::new(), env)
                .unwrap();
        assert_eq!(resolved.topic.source, ValueSource::Default);
    }

    #[test]
    fn test_invalid_env_is_error() {
        let env = env_from(&[(NOTIFICATIONS_ENV, "sometimes")]);
        let err =
            resolve_config_with_env(&TicketwatchConfig::new(), &ConfigOverrides::new(), env)
                .unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains(NOTIFICATIONS_ENV)));
    }

    #[test]
    fn test_invalid_cli_url_is_error() {
        let overrides = ConfigOverrides::new().with_stream_url("localhost:8080");
        assert!(
            resolve_config_with_env(&TicketwatchConfig::new(), &overrides, no_env()).is_err()
        );
    }

    #[test]
    fn test_session_config_mapping() {
        let overrides = ConfigOverrides::new()
            .with_badge_expiry_ms(1200)
            .with_notifications(NotificationPermission::Granted);
        let resolved =
            resolve_config_with_env(&TicketwatchConfig::new(), &overrides, no_env()).unwrap();
        let session = resolved.session_config();
        assert_eq!(session.engine.badge_expiry, Duration::from_millis(1200));
        assert!(session.engine.permission.is_granted());
        assert_eq!(session.stream.topic, DEFAULT_TOPIC);
        assert_eq!(session.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_entries_cover_every_key() {
        let resolved = ResolvedConfig::default();
        let keys: Vec<&str> = resolved.entries().iter().map(|(k, _, _)| *k).collect();
        assert_eq!(keys, crate::config::schema::CONFIG_KEYS);
    }

    #[test]
    fn test_value_source_display() {
        assert_eq!(
            ValueSource::EnvVar("TW_TOPIC".to_string()).to_string(),
            "env:TW_TOPIC"
        );
        assert_eq!(ValueSource::ConfigFile.to_string(), "config");
        assert_eq!(ValueSource::CliFlag.to_string(), "cli");
        assert_eq!(ValueSource::Default.to_string(), "default");
    }
}
