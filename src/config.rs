//! # Configuration
//!
//! Framing limits and logging setup for packet sockets.
//!
//! ## Sources
//! - TOML text or files (`from_toml()`, `from_file()`); missing sections and
//!   fields fall back to their defaults
//! - `PACKET_SOCKET_*` environment variables (`from_env()`)
//! - Plain struct literals over `Default`
//!
//! The defaults reproduce the classic behaviour: 65534-byte payload ceiling,
//! a listen backlog of 5, and an input overflow that resets the buffer while
//! keeping the connection open.
//!
//! ```toml
//! [framing]
//! max_packet_size = 65534
//! listen_backlog = 5
//! overflow_policy = "reset"
//!
//! [logging]
//! app_name = "packet-socket"
//! log_level = "info"
//! json_format = false
//! ```

use crate::core::frame::{LISTEN_BACKLOG, MAX_PACKET_SIZE};
use crate::error::{Result, SocketError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Backlog above which most kernels silently clamp
const BACKLOG_WARN_LIMIT: u32 = 1024;

const MAX_APP_NAME_LEN: usize = 64;

/// Complete socket configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SocketConfig {
    pub framing: FramingConfig,
    pub logging: LoggingConfig,
}

impl SocketConfig {
    /// Read and parse a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SocketError::ConfigError(format!(
                "Failed to open config file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml(&text)
    }

    /// Parse TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| SocketError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults overridden by whichever `PACKET_SOCKET_*` variables are set
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(size) = env_override("PACKET_SOCKET_MAX_PACKET_SIZE")? {
            config.framing.max_packet_size = size;
        }
        if let Some(backlog) = env_override("PACKET_SOCKET_LISTEN_BACKLOG")? {
            config.framing.listen_backlog = backlog;
        }
        if let Some(policy) = env_override("PACKET_SOCKET_OVERFLOW_POLICY")? {
            config.framing.overflow_policy = policy;
        }
        if let Some(level) = env_override("PACKET_SOCKET_LOG_LEVEL")? {
            config.logging.log_level = level;
        }
        Ok(config)
    }

    /// Defaults with `mutator` applied
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// The default configuration rendered as TOML
    pub fn example_config() -> String {
        match toml::to_string_pretty(&Self::default()) {
            Ok(body) => format!("# packet-socket configuration\n\n{body}"),
            Err(e) => format!("# example config unavailable: {e}\n"),
        }
    }

    /// Write the configuration as TOML
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let text = toml::to_string_pretty(self)
            .map_err(|e| SocketError::ConfigError(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, text)
            .map_err(|e| SocketError::ConfigError(format!("Failed to write config file: {e}")))
    }

    /// Every problem found, in section order; empty when valid
    pub fn validate(&self) -> Vec<String> {
        self.framing
            .validate()
            .into_iter()
            .chain(self.logging.validate())
            .collect()
    }

    /// Like [`validate`](Self::validate), folded into a single error
    pub fn validate_strict(&self) -> Result<()> {
        let problems = self.validate();
        if problems.is_empty() {
            return Ok(());
        }
        let listed: String = problems.iter().map(|p| format!("\n  - {p}")).collect();
        Err(SocketError::ConfigError(format!(
            "Configuration validation failed:{listed}"
        )))
    }
}

fn env_override<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| SocketError::ConfigError(format!("Invalid {name}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// What to do when the input buffer fills without yielding a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Discard buffered input and keep the connection open
    #[default]
    Reset,
    /// Discard buffered input and close the connection
    Close,
}

impl FromStr for OverflowPolicy {
    type Err = SocketError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reset" => Ok(OverflowPolicy::Reset),
            "close" => Ok(OverflowPolicy::Close),
            other => Err(SocketError::ConfigError(format!(
                "Invalid overflow policy: '{other}' (expected 'reset' or 'close')"
            ))),
        }
    }
}

/// Framing and buffer configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FramingConfig {
    /// Largest payload accepted by `send`; buffers hold this plus the prefix
    pub max_packet_size: usize,

    /// Pending-connection backlog for listening sockets
    pub listen_backlog: u32,

    pub overflow_policy: OverflowPolicy,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            max_packet_size: MAX_PACKET_SIZE,
            listen_backlog: LISTEN_BACKLOG,
            overflow_policy: OverflowPolicy::Reset,
        }
    }
}

impl FramingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        match self.max_packet_size {
            0 => problems.push("Max packet size cannot be 0".to_string()),
            n if n > MAX_PACKET_SIZE => problems.push(format!(
                "Max packet size too large: {n} bytes (maximum: {MAX_PACKET_SIZE})"
            )),
            _ => {}
        }

        match self.listen_backlog {
            0 => problems.push("Listen backlog must be greater than 0".to_string()),
            n if n > BACKLOG_WARN_LIMIT => problems.push(format!(
                "Listen backlog very high: {n} (most systems cap it at SOMAXCONN)"
            )),
            _ => {}
        }

        problems
    }
}

/// Verbosity of the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `EnvFilter`
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = SocketError;

    fn from_str(s: &str) -> Result<Self> {
        let level = tracing::Level::from_str(s.trim())
            .map_err(|_| SocketError::ConfigError(format!("Invalid log level: {s}")))?;
        Ok(match level {
            tracing::Level::TRACE => LogLevel::Trace,
            tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::INFO => LogLevel::Info,
            tracing::Level::WARN => LogLevel::Warn,
            _ => LogLevel::Error,
        })
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Name attached to the startup log line
    pub app_name: String,
    pub log_level: LogLevel,
    /// Emit JSON lines instead of human-readable output
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: env!("CARGO_PKG_NAME").to_string(),
            log_level: LogLevel::Info,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let len = self.app_name.chars().count();
        if len == 0 {
            vec!["Application name cannot be empty".to_string()]
        } else if len > MAX_APP_NAME_LEN {
            vec![format!(
                "Application name too long: {len} characters (maximum: {MAX_APP_NAME_LEN})"
            )]
        } else {
            Vec::new()
        }
    }
}
