//! # Packet Protocol Layer
//!
//! The event-driven packet socket and the notifications it emits.
//!
//! ## Components
//! - **PacketSocket**: framing, backpressure and lifecycle handling for one
//!   connection or listener
//! - **SocketEvent**: connected / packet / new connection / closed
//!
//! ## Execution model
//! Single-threaded and cooperative: whoever owns the dispatcher calls
//! [`PacketSocket::handle_event`] for each transport notification and drains
//! the socket's events afterwards. No handler blocks and nothing is shared
//! between sockets, so no locking is involved.

pub mod event;
pub mod packet_socket;

pub use event::{SocketEvent, SocketId};
pub use packet_socket::PacketSocket;

#[cfg(test)]
mod tests;
