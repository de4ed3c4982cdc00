//! Configuration for the account-service bridge

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use crate::error::TransportError;

pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: f64 = 5.0;

/// Reads environment variables. Swapped for an in-memory map in tests.
pub trait ReadEnv {
    fn var(&self, key: &str) -> Result<String, env::VarError>;
}

/// Delegates to `std::env`.
pub struct SystemEnv;

impl ReadEnv for SystemEnv {
    #[inline]
    fn var(&self, key: &str) -> Result<String, env::VarError> {
        env::var(key)
    }
}

/// Which binding a transport URI selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum TransportKind {
    Redis,
    Amqp,
    #[strum(serialize = "websocket")]
    WebSocket,
    Nats,
    /// In-process transport used by tests.
    Memory,
}

impl TransportKind {
    /// Pick the binding from the URI scheme. A bare `host:port` means NATS.
    pub fn from_uri(uri: &str) -> Result<Self, TransportError> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(TransportError::UnsupportedUri(String::new()));
        }
        let Some((scheme, _)) = uri.split_once("://") else {
            return Ok(Self::Nats);
        };
        match scheme.to_ascii_lowercase().as_str() {
            "redis" | "rediss" => Ok(Self::Redis),
            "amqp" | "amqps" => Ok(Self::Amqp),
            "ws" | "wss" => Ok(Self::WebSocket),
            "nats" | "tls" => Ok(Self::Nats),
            _ => Err(TransportError::UnsupportedUri(uri.to_string())),
        }
    }
}

/// Bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Broker or socket URI; its scheme selects the transport binding
    #[serde(default = "default_transport_uri")]
    pub transport_uri: String,
    /// Per-call deadline in seconds (fractions allowed)
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: f64,
    /// Exclusive reply queue declared by the AMQP binding
    #[serde(default = "default_reply_queue_name")]
    pub reply_queue_name: String,
    /// Queue the AMQP binding publishes requests to
    #[serde(default = "default_request_queue_name")]
    pub request_queue_name: String,
    /// Channel (or subject) requests are published on
    #[serde(default = "default_request_channel")]
    pub request_channel: String,
    /// Channel (or subject) carrying unsolicited pushes
    #[serde(default = "default_events_channel")]
    pub events_channel: String,
    /// Prefix of the per-call reply channels used by the Redis binding
    #[serde(default = "default_reply_channel_prefix")]
    pub reply_channel_prefix: String,
}

fn default_transport_uri() -> String {
    "amqp://127.0.0.1:5672/%2f".to_string()
}

fn default_request_timeout_seconds() -> f64 {
    DEFAULT_REQUEST_TIMEOUT_SECONDS
}

fn default_reply_queue_name() -> String {
    "rpc_bot_queue".to_string()
}

fn default_request_queue_name() -> String {
    "rpc_api_queue".to_string()
}

fn default_request_channel() -> String {
    "api".to_string()
}

fn default_events_channel() -> String {
    "bot".to_string()
}

fn default_reply_channel_prefix() -> String {
    "api-".to_string()
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            transport_uri: default_transport_uri(),
            request_timeout_seconds: default_request_timeout_seconds(),
            reply_queue_name: default_reply_queue_name(),
            request_queue_name: default_request_queue_name(),
            request_channel: default_request_channel(),
            events_channel: default_events_channel(),
            reply_channel_prefix: default_reply_channel_prefix(),
        }
    }
}

impl RpcConfig {
    pub fn new(transport_uri: impl Into<String>) -> Self {
        Self {
            transport_uri: transport_uri.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_seconds = timeout.as_secs_f64();
        self
    }

    /// Load from `WVKEYS_*` environment variables, defaulting anything unset.
    pub fn from_env<E: ReadEnv>(env: &E) -> Self {
        let mut config = Self::default();
        if let Ok(uri) = env.var("WVKEYS_TRANSPORT_URI") {
            config.transport_uri = uri;
        }
        if let Ok(raw) = env.var("WVKEYS_REQUEST_TIMEOUT_SECONDS") {
            config.request_timeout_seconds = raw
                .trim()
                .parse()
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS);
        }
        if let Ok(name) = env.var("WVKEYS_REPLY_QUEUE") {
            config.reply_queue_name = name;
        }
        if let Ok(name) = env.var("WVKEYS_REQUEST_QUEUE") {
            config.request_queue_name = name;
        }
        if let Ok(name) = env.var("WVKEYS_REQUEST_CHANNEL") {
            config.request_channel = name;
        }
        if let Ok(name) = env.var("WVKEYS_EVENTS_CHANNEL") {
            config.events_channel = name;
        }
        config
    }

    pub fn transport_kind(&self) -> Result<TransportKind, TransportError> {
        TransportKind::from_uri(&self.transport_uri)
    }

    /// The per-call deadline. Non-positive or non-finite values fall back to the default.
    pub fn request_timeout(&self) -> Duration {
        let secs = self.request_timeout_seconds;
        if secs.is_finite() && secs > 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            Duration::from_secs_f64(DEFAULT_REQUEST_TIMEOUT_SECONDS)
        }
    }
}

/// In-memory environment for tests.
#[cfg(any(test, feature = "test-support"))]
#[derive(Default)]
pub struct InMemoryEnv {
    vars: std::collections::HashMap<String, String>,
}

#[cfg(any(test, feature = "test-support"))]
impl InMemoryEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

#[cfg(any(test, feature = "test-support"))]
impl ReadEnv for InMemoryEnv {
    fn var(&self, key: &str) -> Result<String, env::VarError> {
        self.vars.get(key).cloned().ok_or(env::VarError::NotPresent)
    }
}
