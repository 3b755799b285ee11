//! # Packet Socket
//!
//! Turns a non-blocking byte stream into discrete packets and back.
//!
//! Every connection owns one input and one output buffer, each sized for a
//! single maximal frame. The socket reacts to the four transport
//! notifications ([`TransportEvent`]) and queues [`SocketEvent`]s for the
//! consumer; the consumer calls `send`, `send_to` and `send_raw`.
//!
//! ## Outbound backpressure
//! At most one frame is in flight. While the output buffer still holds
//! unwritten bytes, `send` reports success for the full payload length but
//! queues nothing. A send whose immediate flush makes no progress at all is
//! discarded and reported as a failure; a partial flush is reported as
//! success and drains on later `Writable` notifications.
//!
//! ## Inbound reassembly
//! After each receive, every complete frame at the front of the input buffer
//! is emitted and removed, so coalesced frames are all delivered before the
//! handler returns. An input buffer that fills up without yielding a frame
//! is an overflow: the buffered bytes are discarded and, depending on
//! [`OverflowPolicy`], the connection is closed.
//!
//! ## Listening sockets
//! A socket built with `listen = true` only accepts. Each `Readable`
//! notification accepts one connection, wraps it in a new socket and runs one
//! receive on it straight away, since bytes may have landed before the
//! dispatcher learned about the new stream.
//!
//! ```rust
//! use packet_socket::protocol::{PacketSocket, SocketEvent};
//! use packet_socket::transport::memory::MemoryTransport;
//! use packet_socket::transport::TransportEvent;
//!
//! let (a, b) = MemoryTransport::pair();
//! let mut client = PacketSocket::new(a, false);
//! let mut server = PacketSocket::new(b, false);
//!
//! client.send(b"hello").unwrap();
//! server.handle_event(TransportEvent::Readable);
//!
//! match server.poll_event() {
//!     Some(SocketEvent::Packet { payload, .. }) => assert_eq!(&payload[..], b"hello"),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

use bytes::Bytes;
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, trace, warn};

use super::event::{SocketEvent, SocketId};
use crate::config::{FramingConfig, OverflowPolicy};
use crate::core::buffer::FixedBuffer;
use crate::core::frame::{
    buffer_capacity, complete_frame_len, encode_prefix, MAX_PACKET_SIZE, PKT_LEN_SIZE,
};
use crate::error::constants::{
    ERR_ACCEPT_FAILED, ERR_INPUT_OVERFLOW, ERR_LISTEN_FAILED, ERR_RECV_FAILED,
    ERR_SEND_TO_MISMATCH, ERR_WRITE_OVERRUN,
};
use crate::error::{ErrorCode, Result, SocketError};
use crate::transport::{Transport, TransportEvent};
use crate::utils::metrics::{global_metrics, Metrics};

/// Length-prefixed packet framing over one transport
pub struct PacketSocket<T: Transport> {
    id: SocketId,
    transport: T,
    listen: bool,
    closed: bool,
    inbuf: FixedBuffer,
    outbuf: FixedBuffer,
    config: FramingConfig,
    events: VecDeque<SocketEvent<T>>,
    metrics: Arc<Metrics>,
}

impl<T: Transport> PacketSocket<T> {
    /// Wrap `transport` with the default framing configuration
    pub fn new(transport: T, listen: bool) -> Self {
        Self::with_config(transport, listen, &FramingConfig::default())
    }

    /// Wrap `transport`; when `listen` is set, start listening immediately.
    ///
    /// A failed `listen` is logged and the socket is still returned, since
    /// its local binding stays useful for outbound traffic. A
    /// `max_packet_size` above [`MAX_PACKET_SIZE`] is clamped to it.
    pub fn with_config(transport: T, listen: bool, config: &FramingConfig) -> Self {
        let mut config = config.clone();
        if config.max_packet_size > MAX_PACKET_SIZE {
            warn!(
                requested = config.max_packet_size,
                max = MAX_PACKET_SIZE,
                "Max packet size beyond prefix range, clamped"
            );
            config.max_packet_size = MAX_PACKET_SIZE;
        }
        let capacity = buffer_capacity(config.max_packet_size);
        let mut socket = Self {
            id: SocketId::next(),
            transport,
            listen,
            closed: false,
            inbuf: FixedBuffer::new(capacity),
            outbuf: FixedBuffer::new(capacity),
            config,
            events: VecDeque::new(),
            metrics: global_metrics(),
        };

        if listen {
            let backlog = socket.config.listen_backlog;
            match socket.transport.listen(backlog) {
                Ok(()) => debug!(
                    socket = %socket.id,
                    local = ?socket.transport.local_addr(),
                    backlog,
                    "Listening"
                ),
                Err(e) => error!(
                    socket = %socket.id,
                    error = %e,
                    code = ?socket.transport.last_error(),
                    "{ERR_LISTEN_FAILED}"
                ),
            }
        }

        socket
    }

    /// Record into `metrics` instead of the global collector
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Frame `data` and start writing it.
    ///
    /// Returns `data.len()` when the frame was written (fully or partly) and
    /// also when it was dropped because a previous frame is still draining.
    #[instrument(level = "trace", skip(self, data), fields(socket = %self.id, len = data.len()))]
    pub fn send(&mut self, data: &[u8]) -> Result<usize> {
        let prefix = match encode_prefix(data.len(), self.config.max_packet_size) {
            Ok(prefix) => prefix,
            Err(e) => {
                self.transport.set_error(e.code());
                return Err(e);
            }
        };

        // If we are blocking on send, then silently drop this packet
        if !self.outbuf.is_empty() {
            trace!(pending = self.outbuf.len(), "Previous frame still draining, packet dropped");
            self.metrics.packet_dropped();
            return Ok(data.len());
        }

        self.outbuf.extend_from_slice(&prefix);
        self.outbuf.extend_from_slice(data);

        match self.flush() {
            Ok(written) if written > 0 => {
                if !self.outbuf.is_empty() {
                    trace!(written, pending = self.outbuf.len(), "Frame partially written");
                }
                self.metrics.packet_sent(data.len() as u64);
                Ok(data.len())
            }
            Ok(_) => {
                self.outbuf.clear();
                let err = SocketError::TransportFailure(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "transport accepted no bytes",
                ));
                self.transport.set_error(err.code());
                Err(err)
            }
            Err(e) => {
                // No progress at all: drop the frame rather than leave it half-owned
                self.outbuf.clear();
                self.transport.set_error(e.code());
                Err(e)
            }
        }
    }

    /// Send to `addr`, which must be the connected peer
    pub fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> Result<usize> {
        if self.transport.remote_addr() == Some(addr) {
            return self.send(data);
        }

        warn!(
            socket = %self.id,
            target = %addr,
            remote = ?self.transport.remote_addr(),
            "{ERR_SEND_TO_MISMATCH}"
        );
        self.transport.set_error(ErrorCode::NotConnected);
        Err(SocketError::NotConnected(addr))
    }

    /// Queue `data` without a length prefix and try to flush.
    ///
    /// Unlike [`send`](Self::send) this appends to whatever is already
    /// pending, and bytes stay queued when the flush fails.
    #[instrument(level = "trace", skip(self, data), fields(socket = %self.id, len = data.len()))]
    pub fn send_raw(&mut self, data: &[u8]) -> Result<usize> {
        if !self.outbuf.extend_from_slice(data) {
            let err = SocketError::MessageTooLarge(data.len());
            self.transport.set_error(err.code());
            return Err(err);
        }
        self.metrics.raw_queued(data.len() as u64);
        self.flush()
    }

    /// Write as much queued output as the transport takes in one call.
    ///
    /// `Ok(0)` means nothing was written; transport errors (including
    /// would-block) are returned untouched and leave the queue as it was.
    pub fn flush(&mut self) -> Result<usize> {
        let queued = self.outbuf.len();
        if queued == 0 {
            return Ok(0);
        }

        let written = self.transport.send(self.outbuf.filled())?;
        if written == 0 {
            return Ok(0);
        }
        if written > queued {
            warn!(socket = %self.id, written, queued, "{ERR_WRITE_OVERRUN}");
            return Err(SocketError::WriteOverrun { written, queued });
        }

        self.outbuf.consume(written);
        Ok(written)
    }

    /// Dispatch one transport notification to its handler
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.on_connect(),
            TransportEvent::Readable => self.on_readable(),
            TransportEvent::Writable => self.on_writable(),
            TransportEvent::Closed(code) => self.on_close(code),
        }
    }

    pub fn on_connect(&mut self) {
        debug!(socket = %self.id, remote = ?self.transport.remote_addr(), "Connected");
        self.events.push_back(SocketEvent::Connected);
    }

    pub fn on_readable(&mut self) {
        if self.listen {
            self.accept_connection();
        } else {
            self.read_input();
        }
    }

    pub fn on_writable(&mut self) {
        if self.outbuf.is_empty() {
            return;
        }
        match self.flush() {
            Ok(written) => trace!(socket = %self.id, written, pending = self.outbuf.len(), "Flushed"),
            Err(e) if e.is_would_block() => {}
            Err(e) => debug!(socket = %self.id, error = %e, "Flush on writable failed"),
        }
    }

    pub fn on_close(&mut self, code: Option<ErrorCode>) {
        if self.closed {
            return;
        }
        self.closed = true;
        debug!(socket = %self.id, code = ?code, "Closed");
        self.events.push_back(SocketEvent::Closed(code));
    }

    fn accept_connection(&mut self) {
        let (transport, peer) = match self.transport.accept() {
            Ok(accepted) => accepted,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                trace!(socket = %self.id, "No pending connection");
                return;
            }
            Err(e) => {
                self.metrics.accept_error();
                error!(
                    socket = %self.id,
                    error = %e,
                    code = ?self.transport.last_error(),
                    "{ERR_ACCEPT_FAILED}"
                );
                return;
            }
        };

        let mut conn =
            PacketSocket::with_config(transport, false, &self.config).with_metrics(self.metrics.clone());
        self.metrics.connection_accepted();
        info!(listener = %self.id, socket = %conn.id, peer = %peer, "Accepted connection");

        // Prime a read in case data is waiting; packets queue on the new socket
        conn.on_readable();
        self.events.push_back(SocketEvent::NewConnection(conn));
    }

    fn read_input(&mut self) {
        match self.transport.recv(self.inbuf.free_tail()) {
            Ok(n) => self.inbuf.advance(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                self.metrics.read_error();
                error!(socket = %self.id, error = %e, "{ERR_RECV_FAILED}");
                return;
            }
        }

        self.process_input();

        if self.inbuf.is_full() {
            self.handle_overflow();
        }
    }

    /// Emit every complete frame at the front of the input buffer
    fn process_input(&mut self) {
        let remote = self.transport.remote_addr();

        while let Some(frame_len) = complete_frame_len(self.inbuf.filled()) {
            let payload = Bytes::copy_from_slice(&self.inbuf.filled()[PKT_LEN_SIZE..frame_len]);
            self.inbuf.consume(frame_len);

            trace!(socket = %self.id, len = payload.len(), buffered = self.inbuf.len(), "Packet received");
            self.metrics.packet_received(payload.len() as u64);
            self.events.push_back(SocketEvent::Packet { payload, remote });
        }
    }

    fn handle_overflow(&mut self) {
        let buffered = self.inbuf.len();
        self.metrics.buffer_overflow();
        error!(
            socket = %self.id,
            buffered,
            announced = ?crate::core::frame::decode_prefix(self.inbuf.filled()),
            policy = ?self.config.overflow_policy,
            "{ERR_INPUT_OVERFLOW}"
        );
        self.inbuf.clear();

        if self.config.overflow_policy == OverflowPolicy::Close {
            self.transport.set_error(ErrorCode::BufferOverflow);
            if let Err(e) = self.transport.close() {
                warn!(socket = %self.id, error = %e, "Close after overflow failed");
            }
            self.on_close(Some(ErrorCode::BufferOverflow));
        }
    }

    /// Next queued notification, oldest first
    pub fn poll_event(&mut self) -> Option<SocketEvent<T>> {
        self.events.pop_front()
    }

    /// Take every queued notification
    pub fn drain_events(&mut self) -> impl Iterator<Item = SocketEvent<T>> + '_ {
        self.events.drain(..)
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn id(&self) -> SocketId {
        self.id
    }

    pub fn is_listener(&self) -> bool {
        self.listen
    }

    /// True once a close notification was emitted
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Bytes queued for transmission and not yet written
    pub fn pending_output(&self) -> usize {
        self.outbuf.len()
    }

    /// Bytes received but not yet part of a complete frame
    pub fn buffered_input(&self) -> usize {
        self.inbuf.len()
    }

    /// Capacity of each direction's buffer
    pub fn capacity(&self) -> usize {
        self.inbuf.capacity()
    }

    pub fn max_packet_size(&self) -> usize {
        self.config.max_packet_size
    }

    pub fn config(&self) -> &FramingConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.transport.remote_addr()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn last_error(&self) -> Option<ErrorCode> {
        self.transport.last_error()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Release the transport, discarding both buffers
    pub fn into_transport(self) -> T {
        self.transport
    }
}

impl<T: Transport> fmt::Debug for PacketSocket<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketSocket")
            .field("id", &self.id)
            .field("listen", &self.listen)
            .field("closed", &self.closed)
            .field("buffered_input", &self.inbuf.len())
            .field("pending_output", &self.outbuf.len())
            .field("queued_events", &self.events.len())
            .field("remote", &self.transport.remote_addr())
            .finish()
    }
}
