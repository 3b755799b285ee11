//! # Error Types
//!
//! Error handling for the packet socket layer.
//!
//! Two shapes of error live here:
//! - [`SocketError`]: returned from direct consumer calls (`send`, `send_to`,
//!   `send_raw`) and from configuration loading.
//! - [`ErrorCode`]: the last-error code stored on a transport. The framer
//!   writes `MessageTooLarge` / `NotConnected` into it so the consumer can
//!   read every failure through the transport's own reporting channel, and
//!   close notifications carry one.
//!
//! Conditions raised while handling asynchronous transport events (read
//! failures, accept failures, buffer overflow) are logged and never returned
//! to the consumer; see [`crate::protocol::packet_socket`].
//!
//! ## Example Usage
//! ```rust
//! use packet_socket::error::{ErrorCode, SocketError};
//!
//! let err = SocketError::MessageTooLarge(70_000);
//! assert_eq!(err.code(), ErrorCode::MessageTooLarge);
//! ```

use serde::{Deserialize, Serialize};
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Error message constants reused by log lines.
pub mod constants {
    pub const ERR_INPUT_OVERFLOW: &str = "input buffer overflow";
    pub const ERR_RECV_FAILED: &str = "Receive failed";
    pub const ERR_ACCEPT_FAILED: &str = "Accept failed";
    pub const ERR_LISTEN_FAILED: &str = "Listen failed";
    pub const ERR_SEND_TO_MISMATCH: &str = "send_to target is not the connected peer";
    pub const ERR_WRITE_OVERRUN: &str = "transport reported more bytes written than queued";
    pub const ERR_NOT_LISTENING: &str = "Socket is not listening";
    pub const ERR_CLOSED: &str = "Socket is closed";
}

/// Last-error code carried by a transport and by close notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    MessageTooLarge,
    NotConnected,
    BufferOverflow,
    Io(#[serde(with = "io_kind_serde")] io::ErrorKind),
}

impl From<io::ErrorKind> for ErrorCode {
    fn from(kind: io::ErrorKind) -> Self {
        ErrorCode::Io(kind)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::MessageTooLarge => f.write_str("message too large"),
            ErrorCode::NotConnected => f.write_str("not connected"),
            ErrorCode::BufferOverflow => f.write_str("buffer overflow"),
            ErrorCode::Io(kind) => write!(f, "{kind}"),
        }
    }
}

// SocketError is the error type for every fallible consumer-facing call
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("Not connected to {0}")]
    NotConnected(SocketAddr),

    #[error("Transport failure: {0}")]
    TransportFailure(#[from] io::Error),

    #[error("Transport wrote {written} bytes but only {queued} were queued")]
    WriteOverrun { written: usize, queued: usize },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl SocketError {
    /// The code written to the transport's last-error slot for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            SocketError::MessageTooLarge(_) => ErrorCode::MessageTooLarge,
            SocketError::NotConnected(_) => ErrorCode::NotConnected,
            SocketError::TransportFailure(e) => ErrorCode::Io(e.kind()),
            SocketError::WriteOverrun { .. } => ErrorCode::Io(io::ErrorKind::InvalidData),
            SocketError::ConfigError(_) => ErrorCode::Io(io::ErrorKind::InvalidInput),
        }
    }

    /// True when the underlying transport only reported "would block"
    pub fn is_would_block(&self) -> bool {
        matches!(self, SocketError::TransportFailure(e) if e.kind() == io::ErrorKind::WouldBlock)
    }
}

/// Type alias for Results using SocketError
pub type Result<T> = std::result::Result<T, SocketError>;

/// `io::ErrorKind` has no serde impls; it is carried as its debug name.
mod io_kind_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::io::ErrorKind;

    const KINDS: &[ErrorKind] = &[
        ErrorKind::NotFound,
        ErrorKind::PermissionDenied,
        ErrorKind::ConnectionRefused,
        ErrorKind::ConnectionReset,
        ErrorKind::ConnectionAborted,
        ErrorKind::NotConnected,
        ErrorKind::AddrInUse,
        ErrorKind::AddrNotAvailable,
        ErrorKind::BrokenPipe,
        ErrorKind::AlreadyExists,
        ErrorKind::WouldBlock,
        ErrorKind::InvalidInput,
        ErrorKind::InvalidData,
        ErrorKind::TimedOut,
        ErrorKind::WriteZero,
        ErrorKind::Interrupted,
        ErrorKind::Unsupported,
        ErrorKind::UnexpectedEof,
        ErrorKind::OutOfMemory,
        ErrorKind::Other,
    ];

    pub fn serialize<S>(kind: &ErrorKind, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        format!("{kind:?}").serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<ErrorKind, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(KINDS
            .iter()
            .copied()
            .find(|k| format!("{k:?}") == name)
            .unwrap_or(ErrorKind::Other))
    }
}
