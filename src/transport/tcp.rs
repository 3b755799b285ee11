//! # Tokio TCP Transport
//!
//! Adapts Tokio's TCP types to the non-blocking [`Transport`] contract.
//! Bound sockets are held as `socket2` sockets until `listen` succeeds, so a
//! failed listen keeps the binding and can be retried.
//! Reads and writes go through `try_read`/`try_write`; readiness is awaited
//! separately by [`TcpTransport::ready`], which translates it into
//! [`TransportEvent`]s. [`PacketSocket::next_event`] ties the two together
//! so a Tokio task can drive a packet socket without its own dispatcher.
//!
//! ```rust,no_run
//! use packet_socket::config::FramingConfig;
//! use packet_socket::protocol::{PacketSocket, SocketEvent};
//!
//! # async fn run() -> packet_socket::error::Result<()> {
//! let config = FramingConfig::default();
//! let mut listener = PacketSocket::bind("127.0.0.1:5222".parse().unwrap(), &config)?;
//!
//! while let Some(event) = listener.next_event().await {
//!     if let SocketEvent::NewConnection(mut conn) = event {
//!         tokio::spawn(async move {
//!             while let Some(event) = conn.next_event().await {
//!                 if let SocketEvent::Packet { payload, .. } = event {
//!                     let _ = conn.send(&payload);
//!                 }
//!             }
//!         });
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::future::poll_fn;
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::task::{Context, Poll};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::Interest;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, instrument, trace};

use super::{Transport, TransportEvent};
use crate::config::FramingConfig;
use crate::error::constants::{ERR_CLOSED, ERR_NOT_LISTENING};
use crate::error::{ErrorCode, Result};
use crate::protocol::{PacketSocket, SocketEvent};

#[derive(Debug)]
enum State {
    Bound(Socket),
    Listening(TcpListener),
    Connected(TcpStream),
    Closed,
}

/// A Tokio TCP socket in one of its lifecycle stages
#[derive(Debug)]
pub struct TcpTransport {
    state: State,
    local: Option<SocketAddr>,
    peer: Option<SocketAddr>,
    last_error: Option<ErrorCode>,
    announce_connect: bool,
    // set once the stream reached end of file or failed hard
    finished: bool,
    // connection (or error) picked up while waiting for readiness
    pending_accept: Option<io::Result<(TcpStream, SocketAddr)>>,
}

impl TcpTransport {
    /// A non-blocking socket bound to `addr`, ready to `listen`
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        #[cfg(unix)]
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        let local = socket.local_addr()?.as_socket();
        Ok(Self::with_state(State::Bound(socket), local, None))
    }

    /// Open an outbound connection; the first readiness poll reports `Connected`
    pub async fn connect(addr: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let mut transport = Self::from_stream(stream);
        transport.announce_connect = true;
        Ok(transport)
    }

    /// Wrap an already-connected stream
    pub fn from_stream(stream: TcpStream) -> Self {
        let local = stream.local_addr().ok();
        let peer = stream.peer_addr().ok();
        Self::with_state(State::Connected(stream), local, peer)
    }

    fn with_state(state: State, local: Option<SocketAddr>, peer: Option<SocketAddr>) -> Self {
        Self {
            state,
            local,
            peer,
            last_error: None,
            announce_connect: false,
            finished: false,
            pending_accept: None,
        }
    }

    /// Bound but not yet listening
    pub fn is_bound(&self) -> bool {
        matches!(self.state, State::Bound(_))
    }

    pub fn is_listening(&self) -> bool {
        matches!(self.state, State::Listening(_))
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, State::Connected(_)) && !self.finished
    }

    fn fail(&mut self, err: io::Error) -> io::Error {
        if err.kind() != io::ErrorKind::WouldBlock {
            self.last_error = Some(ErrorCode::Io(err.kind()));
        }
        err
    }

    /// Wait until the socket can make progress and report what happened.
    ///
    /// Write readiness is only awaited when `want_write` is set. Sockets
    /// that are closed, failed or were never connected report `Closed`.
    pub async fn ready(&mut self, want_write: bool) -> Vec<TransportEvent> {
        if mem::take(&mut self.announce_connect) {
            return vec![TransportEvent::Connected];
        }
        if self.finished {
            return vec![TransportEvent::Closed(self.last_error)];
        }

        match &mut self.state {
            State::Connected(stream) => {
                let interest = if want_write {
                    Interest::READABLE | Interest::WRITABLE
                } else {
                    Interest::READABLE
                };
                match stream.ready(interest).await {
                    Ok(ready) => {
                        let mut events = Vec::with_capacity(2);
                        if ready.is_readable() || ready.is_read_closed() {
                            events.push(TransportEvent::Readable);
                        }
                        if want_write && (ready.is_writable() || ready.is_write_closed()) {
                            events.push(TransportEvent::Writable);
                        }
                        events
                    }
                    Err(e) => {
                        self.last_error = Some(ErrorCode::Io(e.kind()));
                        self.finished = true;
                        vec![TransportEvent::Closed(self.last_error)]
                    }
                }
            }
            State::Listening(listener) => {
                if self.pending_accept.is_none() {
                    let accepted = poll_fn(|cx| listener.poll_accept(cx)).await;
                    self.pending_accept = Some(accepted);
                }
                vec![TransportEvent::Readable]
            }
            State::Bound(_) | State::Closed => vec![TransportEvent::Closed(self.last_error)],
        }
    }
}

impl Transport for TcpTransport {
    fn listen(&mut self, backlog: u32) -> io::Result<()> {
        let listened = match &self.state {
            State::Bound(socket) => socket.listen(i32::try_from(backlog).unwrap_or(i32::MAX)),
            State::Listening(_) => return Ok(()),
            _ => Err(io::Error::new(io::ErrorKind::InvalidInput, "socket is not bound")),
        };
        if let Err(e) = listened {
            return Err(self.fail(e));
        }

        // Listening in the kernel now; hand the socket over to tokio
        match mem::replace(&mut self.state, State::Closed) {
            State::Bound(socket) => match TcpListener::from_std(socket.into()) {
                Ok(listener) => {
                    self.local = listener.local_addr().ok().or(self.local);
                    self.state = State::Listening(listener);
                    Ok(())
                }
                Err(e) => Err(self.fail(e)),
            },
            other => {
                self.state = other;
                Ok(())
            }
        }
    }

    fn accept(&mut self) -> io::Result<(Self, SocketAddr)> {
        let polled = match self.pending_accept.take() {
            Some(accepted) => Some(Poll::Ready(accepted)),
            None => match &self.state {
                State::Listening(listener) => {
                    let mut cx = Context::from_waker(futures::task::noop_waker_ref());
                    Some(listener.poll_accept(&mut cx))
                }
                _ => None,
            },
        };

        let accepted = match polled {
            Some(Poll::Ready(accepted)) => accepted,
            Some(Poll::Pending) => return Err(io::ErrorKind::WouldBlock.into()),
            None => {
                let err = io::Error::new(io::ErrorKind::InvalidInput, ERR_NOT_LISTENING);
                return Err(self.fail(err));
            }
        };

        match accepted {
            Ok((stream, peer)) => {
                trace!(peer = %peer, "TCP connection accepted");
                let mut conn = Self::from_stream(stream);
                conn.peer = Some(peer);
                Ok((conn, peer))
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = match &self.state {
            State::Connected(stream) if !self.finished => stream.try_write(buf),
            _ => Err(io::Error::new(io::ErrorKind::NotConnected, ERR_CLOSED)),
        };
        result.map_err(|e| self.fail(e))
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let result = match &self.state {
            State::Connected(stream) if !self.finished => stream.try_read(buf),
            _ => Err(io::Error::new(io::ErrorKind::NotConnected, ERR_CLOSED)),
        };
        match result {
            Ok(0) if !buf.is_empty() => {
                debug!(peer = ?self.peer, "Peer closed the stream");
                self.finished = true;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(e),
            Err(e) => {
                self.finished = true;
                Err(self.fail(e))
            }
        }
    }

    fn close(&mut self) -> io::Result<()> {
        // Dropping the tokio socket closes the descriptor
        self.state = State::Closed;
        self.pending_accept = None;
        Ok(())
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local
    }

    fn last_error(&self) -> Option<ErrorCode> {
        self.last_error
    }

    fn set_error(&mut self, code: ErrorCode) {
        self.last_error = Some(code);
    }
}

impl PacketSocket<TcpTransport> {
    /// Bind `addr` and listen on it.
    ///
    /// Binding errors are returned. A failed `listen` is only logged; the
    /// socket keeps its binding, and [`next_event`](Self::next_event) reports
    /// `Closed` since there is nothing to wait on.
    #[instrument(skip(config))]
    pub fn bind(addr: SocketAddr, config: &FramingConfig) -> Result<Self> {
        let transport = TcpTransport::bind(addr)?;
        Ok(PacketSocket::with_config(transport, true, config))
    }

    /// Connect to `addr`; the first event is `Connected`
    #[instrument(skip(config))]
    pub async fn connect(addr: SocketAddr, config: &FramingConfig) -> Result<Self> {
        let transport = TcpTransport::connect(addr).await?;
        Ok(PacketSocket::with_config(transport, false, config))
    }

    /// Next notification, waiting on socket readiness when none is queued.
    ///
    /// Returns `None` once the socket has closed and every queued event has
    /// been taken.
    pub async fn next_event(&mut self) -> Option<SocketEvent<TcpTransport>> {
        loop {
            if let Some(event) = self.poll_event() {
                return Some(event);
            }
            if self.is_closed() {
                return None;
            }
            let want_write = self.pending_output() > 0;
            for event in self.transport_mut().ready(want_write).await {
                self.handle_event(event);
            }
        }
    }
}
