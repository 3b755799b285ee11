//! # Byte Transports
//!
//! The framer sits on top of a non-blocking, event-driven byte stream. This
//! module defines the contract it needs from that stream ([`Transport`]) and
//! the four lifecycle notifications a transport (or the loop that drives it)
//! delivers ([`TransportEvent`]).
//!
//! ## Implementations
//! - [`memory`]: single-threaded in-memory loopback, used by the tests and by
//!   consumers that run their own dispatcher
//! - [`tcp`]: Tokio TCP sockets driven through readiness
//!
//! ## Contract
//! - `send`/`recv` never block. "Nothing could be done right now" is reported
//!   as `io::ErrorKind::WouldBlock`, which the framer does not treat as a
//!   failure.
//! - `recv` returning `Ok(0)` for a non-empty buffer means end of stream; the
//!   transport is expected to follow it with a `Closed` notification.
//! - The last-error slot is writable so the framer can report its own
//!   conditions (`MessageTooLarge`, `NotConnected`) through it.

use std::io;
use std::net::SocketAddr;

use crate::error::ErrorCode;

pub mod memory;
pub mod tcp;

/// Lifecycle notification delivered to a packet socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// An outbound connection completed
    Connected,
    /// Bytes (or, for a listener, a pending connection) can be taken
    Readable,
    /// The send side has room again
    Writable,
    /// The connection is gone; carries the error that closed it, if any
    Closed(Option<ErrorCode>),
}

/// Non-blocking byte-stream socket
pub trait Transport: Sized {
    /// Start accepting inbound connections
    fn listen(&mut self, backlog: u32) -> io::Result<()>;

    /// Take one pending inbound connection
    fn accept(&mut self) -> io::Result<(Self, SocketAddr)>;

    /// Write as much of `buf` as the stream accepts right now
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Read whatever is available into `buf`
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Shut the connection down
    fn close(&mut self) -> io::Result<()>;

    fn remote_addr(&self) -> Option<SocketAddr>;

    fn local_addr(&self) -> Option<SocketAddr>;

    fn last_error(&self) -> Option<ErrorCode>;

    fn set_error(&mut self, code: ErrorCode);
}
