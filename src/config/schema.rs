//! KDL schema for config.kdl.
//!
//! This module provides:
//! - The Rust struct representing the KDL schema
//! - Serialization/deserialization to/from KDL format
//! - Validation and the built-in defaults
//! - String parsing for `tw config set`

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};

use crate::notify::NotificationPermission;
use crate::transport::StreamProtocol;

pub const DEFAULT_API_BASE: &str = "http://localhost:8080/api";
pub const DEFAULT_STREAM_URL: &str = "ws://localhost:8080/ws/websocket";
pub const DEFAULT_TOPIC: &str = "/topic/tickets";
pub const DEFAULT_BADGE_EXPIRY_MS: u64 = 5000;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Every key config.kdl understands, in display order.
pub const CONFIG_KEYS: &[&str] = &[
    "api-base",
    "stream-url",
    "stream-protocol",
    "topic",
    "badge-expiry-ms",
    "notifications",
    "reconnect",
    "max-reconnect-attempts",
    "request-timeout-secs",
    "output-format",
];

/// Output format preference for CLI commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON output (default, machine-readable)
    #[default]
    Json,
    /// Human-readable output
    Human,
}

impl OutputFormat {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "human" => Some(OutputFormat::Human),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Human => "human",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User preferences stored in config.kdl.
///
/// # KDL Schema
///
/// ```kdl
/// api-base "http://localhost:8080/api"
/// stream-url "ws://localhost:8080/ws/websocket"
/// stream-protocol "stomp"  // or "json"
/// topic "/topic/tickets"
/// badge-expiry-ms 5000
/// notifications "granted"  // "default", "granted" or "denied"
/// reconnect #true
/// max-reconnect-attempts 10
/// request-timeout-secs 10
/// output-format "human"  // or "json"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketwatchConfig {
    /// Base URL of the ticket REST API
    pub api_base: Option<String>,
    /// WebSocket URL of the event stream
    pub stream_url: Option<String>,
    pub stream_protocol: Option<StreamProtocol>,
    /// Destination the STOMP client subscribes to
    pub topic: Option<String>,
    pub badge_expiry_ms: Option<u64>,
    pub notifications: Option<NotificationPermission>,
    pub reconnect: Option<bool>,
    pub max_reconnect_attempts: Option<u32>,
    pub request_timeout_secs: Option<u64>,
    pub output_format: Option<OutputFormat>,
}

impl TicketwatchConfig {
    /// Create an empty config with no values set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config values.
    ///
    /// Returns an error message if any value is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref url) = self.api_base {
            validate_url("api-base", url, &["http://", "https://"])?;
        }
        if let Some(ref url) = self.stream_url {
            validate_url("stream-url", url, &["ws://", "wss://"])?;
        }
        if let Some(ref topic) = self.topic {
            if topic.trim().is_empty() {
                return Err("topic must not be empty".to_string());
            }
        }
        if self.badge_expiry_ms == Some(0) {
            return Err("badge-expiry-ms must be greater than 0".to_string());
        }
        if self.max_reconnect_attempts == Some(0) {
            return Err("max-reconnect-attempts must be at least 1".to_string());
        }
        if self.request_timeout_secs == Some(0) {
            return Err("request-timeout-secs must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Parse config from a KDL document.
    ///
    /// Unknown keys and values of the wrong type are ignored.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        Self {
            api_base: string_value(doc, "api-base"),
            stream_url: string_value(doc, "stream-url"),
            stream_protocol: string_value(doc, "stream-protocol")
                .and_then(|s| StreamProtocol::parse(&s)),
            topic: string_value(doc, "topic"),
            badge_expiry_ms: integer_value(doc, "badge-expiry-ms")
                .and_then(|i| u64::try_from(i).ok()),
            notifications: string_value(doc, "notifications")
                .and_then(|s| NotificationPermission::parse(&s)),
            reconnect: first_value(doc, "reconnect").and_then(KdlValue::as_bool),
            max_reconnect_attempts: integer_value(doc, "max-reconnect-attempts")
                .and_then(|i| u32::try_from(i).ok()),
            request_timeout_secs: integer_value(doc, "request-timeout-secs")
                .and_then(|i| u64::try_from(i).ok()),
            output_format: string_value(doc, "output-format")
                .and_then(|s| OutputFormat::parse(&s)),
        }
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        push_node(&mut doc, "api-base", self.api_base.clone().map(KdlValue::String));
        push_node(&mut doc, "stream-url", self.stream_url.clone().map(KdlValue::String));
        push_node(
            &mut doc,
            "stream-protocol",
            self.stream_protocol
                .map(|p| KdlValue::String(p.as_str().to_string())),
        );
        push_node(&mut doc, "topic", self.topic.clone().map(KdlValue::String));
        push_node(
            &mut doc,
            "badge-expiry-ms",
            self.badge_expiry_ms.map(|v| KdlValue::Integer(v as i128)),
        );
        push_node(
            &mut doc,
            "notifications",
            self.notifications
                .map(|p| KdlValue::String(p.as_str().to_string())),
        );
        push_node(&mut doc, "reconnect", self.reconnect.map(KdlValue::Bool));
        push_node(
            &mut doc,
            "max-reconnect-attempts",
            self.max_reconnect_attempts
                .map(|v| KdlValue::Integer(v as i128)),
        );
        push_node(
            &mut doc,
            "request-timeout-secs",
            self.request_timeout_secs
                .map(|v| KdlValue::Integer(v as i128)),
        );
        push_node(
            &mut doc,
            "output-format",
            self.output_format
                .map(|f| KdlValue::String(f.as_str().to_string())),
        );

        doc
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` if they are Some.
    pub fn merge(&mut self, other: &TicketwatchConfig) {
        if other.api_base.is_some() {
            self.api_base = other.api_base.clone();
        }
        if other.stream_url.is_some() {
            self.stream_url = other.stream_url.clone();
        }
        if other.stream_protocol.is_some() {
            self.stream_protocol = other.stream_protocol;
        }
        if other.topic.is_some() {
            self.topic = other.topic.clone();
        }
        if other.badge_expiry_ms.is_some() {
            self.badge_expiry_ms = other.badge_expiry_ms;
        }
        if other.notifications.is_some() {
            self.notifications = other.notifications;
        }
        if other.reconnect.is_some() {
            self.reconnect = other.reconnect;
        }
        if other.max_reconnect_attempts.is_some() {
            self.max_reconnect_attempts = other.max_reconnect_attempts;
        }
        if other.request_timeout_secs.is_some() {
            self.request_timeout_secs = other.request_timeout_secs;
        }
        if other.output_format.is_some() {
            self.output_format = other.output_format;
        }
    }

    /// Set one key from its string form, as typed on the command line.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        let value = value.trim();
        match key {
            "api-base" => self.api_base = Some(value.to_string()),
            "stream-url" => self.stream_url = Some(value.to_string()),
            "stream-protocol" => {
                self.stream_protocol = Some(
                    StreamProtocol::parse(value)
                        .ok_or_else(|| invalid(key, value, "stomp or json"))?,
                )
            }
            "topic" => self.topic = Some(value.to_string()),
            "badge-expiry-ms" => self.badge_expiry_ms = Some(parse_number(key, value)?),
            "notifications" => {
                self.notifications = Some(
                    NotificationPermission::parse(value)
                        .ok_or_else(|| invalid(key, value, "default, granted or denied"))?,
                )
            }
            "reconnect" => self.reconnect = Some(parse_bool(key, value)?),
            "max-reconnect-attempts" => {
                self.max_reconnect_attempts = Some(parse_number(key, value)?)
            }
            "request-timeout-secs" => self.request_timeout_secs = Some(parse_number(key, value)?),
            "output-format" => {
                self.output_format = Some(
                    OutputFormat::parse(value)
                        .ok_or_else(|| invalid(key, value, "json or human"))?,
                )
            }
            _ => {
                return Err(format!(
                    "unknown config key '{}' (expected one of: {})",
                    key,
                    CONFIG_KEYS.join(", ")
                ));
            }
        }
        self.validate()
    }
}

fn validate_url(key: &str, url: &str, schemes: &[&str]) -> Result<(), String> {
    if schemes.iter().any(|scheme| url.starts_with(scheme)) {
        Ok(())
    } else {
        Err(format!(
            "{} must start with {}, got '{}'",
            key,
            schemes.join(" or "),
            url
        ))
    }
}

fn invalid(key: &str, value: &str, expected: &str) -> String {
    format!("invalid {} '{}' (expected {})", key, value, expected)
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .parse::<T>()
        .map_err(|_| invalid(key, value, "a non-negative integer"))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, String> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(key, value, "true or false")),
    }
}

fn first_value<'a>(doc: &'a KdlDocument, key: &str) -> Option<&'a KdlValue> {
    doc.get(key)
        .and_then(|node| node.entries().first())
        .map(|entry| entry.value())
}

fn string_value(doc: &KdlDocument, key: &str) -> Option<String> {
    first_value(doc, key)
        .and_then(KdlValue::as_string)
        .map(str::to_string)
}

fn integer_value(doc: &KdlDocument, key: &str) -> Option<i128> {
    first_value(doc, key).and_then(KdlValue::as_integer)
}

fn push_node(doc: &mut KdlDocument, key: &str, value: Option<KdlValue>) {
    if let Some(value) = value {
        let mut node = KdlNode::new(key);
        node.push(KdlEntry::new(value));
        doc.nodes_mut().push(node);
    }
}
