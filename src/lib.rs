//! # Packet Socket
//!
//! Length-prefixed packet framing over non-blocking, event-driven byte-stream
//! sockets.
//!
//! A [`PacketSocket`](protocol::PacketSocket) wraps one stream transport and
//! turns it into a packet transport: every outbound payload is preceded by a
//! 2-byte big-endian length, and inbound bytes are reassembled into whole
//! packets regardless of how the stream split or merged them. Listening
//! sockets accept connections and hand each one out as a new packet socket.
//!
//! ## Modules
//! - [`core`]: wire format, fixed buffers and the Tokio codec
//! - [`protocol`]: the packet socket and its events
//! - [`transport`]: the byte-stream contract plus in-memory and Tokio TCP
//!   implementations
//! - [`config`]: framing and logging configuration
//! - [`utils`]: logging setup and metrics
//! - [`error`]: error types and transport error codes
//!
//! ## Example
//! ```rust
//! use packet_socket::{MemoryTransport, PacketSocket, SocketEvent, TransportEvent};
//!
//! let (a, b) = MemoryTransport::pair();
//! let mut alice = PacketSocket::new(a, false);
//! let mut bob = PacketSocket::new(b, false);
//!
//! alice.send(b"one").unwrap();
//! alice.send(b"two").unwrap();
//! bob.handle_event(TransportEvent::Readable);
//!
//! let packets: Vec<_> = bob
//!     .drain_events()
//!     .filter_map(|e| e.payload().map(|p| p.to_vec()))
//!     .collect();
//! assert_eq!(packets, vec![b"one".to_vec(), b"two".to_vec()]);
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use config::{FramingConfig, OverflowPolicy, SocketConfig};
pub use core::codec::FrameCodec;
pub use core::frame::{BUF_SIZE, LISTEN_BACKLOG, MAX_PACKET_SIZE, PKT_LEN_SIZE};
pub use error::{ErrorCode, Result, SocketError};
pub use protocol::{PacketSocket, SocketEvent, SocketId};
pub use transport::memory::{MemoryConnector, MemoryTransport};
pub use transport::tcp::TcpTransport;
pub use transport::{Transport, TransportEvent};
