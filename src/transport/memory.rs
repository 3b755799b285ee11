//! In-memory loopback transport
//!
//! Single-threaded byte pipes that honour the non-blocking [`Transport`]
//! contract. Useful for driving a [`PacketSocket`](crate::protocol::packet_socket::PacketSocket)
//! from a hand-written dispatcher and for reproducing awkward network
//! behaviour deterministically:
//! - a write window that caps how many bytes the next sends accept
//!   (`Some(0)` stalls the sender completely)
//! - one-shot injected errors for `recv`, `accept` and `listen`
//! - listeners fed by a [`MemoryConnector`]
//!
//! ```rust
//! use packet_socket::transport::memory::MemoryTransport;
//! use packet_socket::transport::Transport;
//!
//! let (mut a, mut b) = MemoryTransport::pair();
//! a.send(b"hi").unwrap();
//! let mut buf = [0u8; 8];
//! assert_eq!(b.recv(&mut buf).unwrap(), 2);
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::rc::Rc;

use super::Transport;
use crate::error::ErrorCode;

#[derive(Debug, Default)]
struct Pipe {
    data: VecDeque<u8>,
    writer_closed: bool,
}

type SharedPipe = Rc<RefCell<Pipe>>;
type AcceptQueue = Rc<RefCell<VecDeque<(MemoryTransport, SocketAddr)>>>;

#[derive(Debug)]
enum Role {
    Stream { inbound: SharedPipe, outbound: SharedPipe },
    Listener { queue: AcceptQueue, listening: bool },
}

/// One endpoint of an in-memory connection, or an in-memory listener
#[derive(Debug)]
pub struct MemoryTransport {
    role: Role,
    local: SocketAddr,
    peer: Option<SocketAddr>,
    closed: bool,
    write_window: Option<usize>,
    last_error: Option<ErrorCode>,
    fail_next_recv: Option<io::ErrorKind>,
    fail_next_accept: Option<io::ErrorKind>,
    fail_listen: Option<io::ErrorKind>,
}

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

impl MemoryTransport {
    fn with_role(role: Role, local: SocketAddr, peer: Option<SocketAddr>) -> Self {
        Self {
            role,
            local,
            peer,
            closed: false,
            write_window: None,
            last_error: None,
            fail_next_recv: None,
            fail_next_accept: None,
            fail_listen: None,
        }
    }

    /// Two connected endpoints on 127.0.0.1:40001 and 127.0.0.1:40002
    pub fn pair() -> (Self, Self) {
        Self::pair_with_addrs(loopback(40001), loopback(40002))
    }

    /// Two connected endpoints with explicit addresses
    pub fn pair_with_addrs(a: SocketAddr, b: SocketAddr) -> (Self, Self) {
        let a_to_b: SharedPipe = Rc::default();
        let b_to_a: SharedPipe = Rc::default();
        let left = Self::with_role(
            Role::Stream {
                inbound: b_to_a.clone(),
                outbound: a_to_b.clone(),
            },
            a,
            Some(b),
        );
        let right = Self::with_role(
            Role::Stream {
                inbound: a_to_b,
                outbound: b_to_a,
            },
            b,
            Some(a),
        );
        (left, right)
    }

    /// A not-yet-listening socket bound to `addr`, plus a connector that
    /// queues inbound connections for it
    pub fn listener(addr: SocketAddr) -> (Self, MemoryConnector) {
        let queue: AcceptQueue = Rc::default();
        let transport = Self::with_role(
            Role::Listener {
                queue: queue.clone(),
                listening: false,
            },
            addr,
            None,
        );
        (transport, MemoryConnector { addr, queue })
    }

    /// Cap the total bytes the following sends accept; `None` lifts the cap
    pub fn set_write_window(&mut self, window: Option<usize>) {
        self.write_window = window;
    }

    /// Make the next `recv` fail with `kind`
    pub fn fail_next_recv(&mut self, kind: io::ErrorKind) {
        self.fail_next_recv = Some(kind);
    }

    /// Make the next `accept` fail with `kind`
    pub fn fail_next_accept(&mut self, kind: io::ErrorKind) {
        self.fail_next_accept = Some(kind);
    }

    /// Make `listen` fail with `kind`
    pub fn fail_listen(&mut self, kind: io::ErrorKind) {
        self.fail_listen = Some(kind);
    }

    /// Bytes written by the peer and not yet received
    pub fn available(&self) -> usize {
        match &self.role {
            Role::Stream { inbound, .. } => inbound.borrow().data.len(),
            Role::Listener { .. } => 0,
        }
    }

    /// Connections waiting to be accepted
    pub fn pending_connections(&self) -> usize {
        match &self.role {
            Role::Listener { queue, .. } => queue.borrow().len(),
            Role::Stream { .. } => 0,
        }
    }

    pub fn is_listening(&self) -> bool {
        matches!(self.role, Role::Listener { listening: true, .. })
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn fail(&mut self, kind: io::ErrorKind) -> io::Error {
        self.last_error = Some(ErrorCode::Io(kind));
        io::Error::from(kind)
    }
}

impl Transport for MemoryTransport {
    fn listen(&mut self, _backlog: u32) -> io::Result<()> {
        if let Some(kind) = self.fail_listen {
            return Err(self.fail(kind));
        }
        if let Role::Listener { listening, .. } = &mut self.role {
            *listening = true;
            return Ok(());
        }
        Err(self.fail(io::ErrorKind::InvalidInput))
    }

    fn accept(&mut self) -> io::Result<(Self, SocketAddr)> {
        if let Some(kind) = self.fail_next_accept.take() {
            return Err(self.fail(kind));
        }
        let next = match &self.role {
            Role::Listener {
                queue,
                listening: true,
            } => Some(queue.borrow_mut().pop_front()),
            _ => None,
        };
        match next {
            Some(Some(conn)) => Ok(conn),
            Some(None) => Err(io::Error::from(io::ErrorKind::WouldBlock)),
            None => Err(self.fail(io::ErrorKind::InvalidInput)),
        }
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(self.fail(io::ErrorKind::NotConnected));
        }
        let Role::Stream { outbound, .. } = &self.role else {
            return Err(self.fail(io::ErrorKind::NotConnected));
        };

        let n = match self.write_window {
            Some(0) if !buf.is_empty() => {
                return Err(io::Error::from(io::ErrorKind::WouldBlock));
            }
            Some(window) => buf.len().min(window),
            None => buf.len(),
        };
        outbound.borrow_mut().data.extend(&buf[..n]);
        if let Some(window) = self.write_window.as_mut() {
            *window -= n;
        }
        Ok(n)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(kind) = self.fail_next_recv.take() {
            return Err(self.fail(kind));
        }
        if self.closed {
            return Err(self.fail(io::ErrorKind::NotConnected));
        }
        let Role::Stream { inbound, .. } = &self.role else {
            return Err(self.fail(io::ErrorKind::NotConnected));
        };

        let mut pipe = inbound.borrow_mut();
        if buf.is_empty() {
            return Ok(0);
        }
        if pipe.data.is_empty() {
            return if pipe.writer_closed {
                Ok(0)
            } else {
                Err(io::Error::from(io::ErrorKind::WouldBlock))
            };
        }
        let n = buf.len().min(pipe.data.len());
        for (slot, byte) in buf.iter_mut().zip(pipe.data.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn close(&mut self) -> io::Result<()> {
        if let Role::Stream { outbound, .. } = &self.role {
            outbound.borrow_mut().writer_closed = true;
        }
        self.closed = true;
        Ok(())
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local)
    }

    fn last_error(&self) -> Option<ErrorCode> {
        self.last_error
    }

    fn set_error(&mut self, code: ErrorCode) {
        self.last_error = Some(code);
    }
}

/// Opens in-memory connections to a [`MemoryTransport::listener`]
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    addr: SocketAddr,
    queue: AcceptQueue,
}

impl MemoryConnector {
    /// Queue a connection from `from` and return the client end
    pub fn connect(&self, from: SocketAddr) -> MemoryTransport {
        let (client, server) = MemoryTransport::pair_with_addrs(from, self.addr);
        self.queue.borrow_mut().push_back((server, from));
        client
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}
