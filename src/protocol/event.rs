//! Consumer-facing notifications
//!
//! Each [`PacketSocket`] queues its own events; the consumer drains them with
//! [`PacketSocket::poll_event`] (or `next_event` on Tokio TCP sockets). The
//! socket an event came from is the socket it was polled from.

use bytes::Bytes;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use super::packet_socket::PacketSocket;
use crate::error::ErrorCode;
use crate::transport::Transport;

/// Process-unique socket identifier, used in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(u64);

static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

impl SocketId {
    pub(crate) fn next() -> Self {
        SocketId(NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sock-{}", self.0)
    }
}

/// Notification emitted by a packet socket
#[derive(Debug)]
pub enum SocketEvent<T: Transport> {
    /// The outbound connection completed
    Connected,
    /// One complete packet arrived
    Packet {
        payload: Bytes,
        remote: Option<SocketAddr>,
    },
    /// A listening socket accepted a connection; the consumer now owns it.
    /// Packets that were already waiting on the wire are queued on the new
    /// socket and can be polled from it right away.
    NewConnection(PacketSocket<T>),
    /// The connection closed, with the transport's error code if any
    Closed(Option<ErrorCode>),
}

impl<T: Transport> SocketEvent<T> {
    /// Payload of a `Packet` event
    pub fn payload(&self) -> Option<&Bytes> {
        match self {
            SocketEvent::Packet { payload, .. } => Some(payload),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SocketEvent::Closed(_))
    }
}
