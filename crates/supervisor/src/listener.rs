// SPDX-License-Identifier: MIT

//! Listening-socket configuration and lifecycle.
//!
//! A listener owns one listening address: transport, protocol tag, worker
//! count, and the socket options applied at bind time. It is either bound
//! once in the master and inherited by every child, or (with `reuse_port`)
//! bound independently by each worker so the kernel load-balances accepts.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs, UdpSocket};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use std::time::Duration;

use socket2::{Domain, Socket, Type};
use thiserror::Error;

use crate::connection::{ConnStream, Connection, ConnectionId};
use crate::event_loop::{EventLoop, Token};

/// Socket-layer transport. `Ssl` is TCP at this layer; the handshake
/// belongs to the protocol collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
    Ssl,
    Unix,
}

impl Transport {
    /// Parse a URI scheme: `tcp`, `udp`, `ssl`, `unix`.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "tcp" => Some(Self::Tcp),
            "udp" => Some(Self::Udp),
            "ssl" => Some(Self::Ssl),
            "unix" => Some(Self::Unix),
            _ => None,
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Ssl => "ssl",
            Self::Unix => "unix",
        }
    }
}

/// Application-protocol tag carried on every accepted connection.
///
/// Opaque to the supervisor; only the protocol collaborator decodes bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolTag {
    Frame,
    Text,
    Http,
    WebSocket,
    #[default]
    Raw,
}

impl ProtocolTag {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "frame" => Some(Self::Frame),
            "text" => Some(Self::Text),
            "http" => Some(Self::Http),
            "websocket" => Some(Self::WebSocket),
            "raw" => Some(Self::Raw),
            _ => None,
        }
    }
}

/// Socket options applied when the listening socket is built.
#[derive(Debug, Clone)]
pub struct SocketContext {
    pub backlog: i32,
    pub reuse_addr: bool,
    pub tcp_nodelay: bool,
    pub keepalive: Option<Duration>,
}

impl Default for SocketContext {
    fn default() -> Self {
        Self {
            backlog: 102_400,
            reuse_addr: true,
            tcp_nodelay: false,
            keepalive: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("invalid listen address: {address}")]
    Address { address: String },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("listener {name} is not bound")]
    NotBuilt { name: String },
}

/// Called once per accepted connection.
pub type ConnectCallback = Box<dyn Fn(&mut Connection)>;
/// Called with every chunk of inbound bytes on a stream connection.
pub type MessageCallback = Box<dyn Fn(&mut Connection, &[u8])>;
/// Called with every inbound datagram on a UDP listener.
pub type DatagramCallback = Box<dyn Fn(&UdpSocket, SocketAddr, &[u8])>;

enum BoundSocket {
    Tcp(TcpListener),
    Udp(UdpSocket),
    Unix(UnixListener),
}

pub struct Listener {
    transport: Transport,
    address: String,
    context: SocketContext,
    protocol: ProtocolTag,
    worker_count: u32,
    name: String,
    reuse_port: bool,
    socket: Option<BoundSocket>,
    accepting: bool,
    on_connect: Option<ConnectCallback>,
    on_message: Option<MessageCallback>,
    on_datagram: Option<DatagramCallback>,
}

impl Listener {
    pub fn new(transport: Transport, address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            transport,
            name: address.clone(),
            address,
            context: SocketContext::default(),
            protocol: ProtocolTag::default(),
            worker_count: 1,
            reuse_port: false,
            socket: None,
            accepting: false,
            on_connect: None,
            on_message: None,
            on_datagram: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of worker processes serving this listener (min 1).
    pub fn with_workers(mut self, count: u32) -> Self {
        self.worker_count = count.max(1);
        self
    }

    pub fn with_protocol(mut self, protocol: ProtocolTag) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_context(mut self, context: SocketContext) -> Self {
        self.context = context;
        self
    }

    /// Bind per worker with `SO_REUSEPORT` instead of once in the master.
    pub fn with_reuse_port(mut self, reuse_port: bool) -> Self {
        self.reuse_port = reuse_port;
        self
    }

    pub fn on_connect(mut self, cb: ConnectCallback) -> Self {
        self.on_connect = Some(cb);
        self
    }

    pub fn on_message(mut self, cb: MessageCallback) -> Self {
        self.on_message = Some(cb);
        self
    }

    pub fn on_datagram(mut self, cb: DatagramCallback) -> Self {
        self.on_datagram = Some(cb);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn protocol(&self) -> ProtocolTag {
        self.protocol
    }

    pub fn worker_count(&self) -> u32 {
        self.worker_count
    }

    pub fn reuse_port(&self) -> bool {
        self.reuse_port
    }

    /// The listen address; reflects the kernel-assigned port after a
    /// port-0 bind.
    pub fn local_addr(&self) -> &str {
        &self.address
    }

    pub fn is_bound(&self) -> bool {
        self.socket.is_some()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    /// Bind and listen in the master. Idempotent per process; skipped
    /// entirely when `reuse_port` is set (each worker binds instead).
    pub fn build(&mut self) -> Result<(), ListenerError> {
        if self.socket.is_some() {
            return Ok(());
        }
        self.bind_socket(false)
    }

    /// Bind inside a worker with `SO_REUSEPORT` so siblings share the port.
    pub fn build_in_worker(&mut self) -> Result<(), ListenerError> {
        if self.socket.is_some() {
            return Ok(());
        }
        self.bind_socket(true)
    }

    /// Release the fds of every listener this worker did not claim, so
    /// only the assigned worker accepts on each socket. Closes fds only;
    /// on-disk state (unix socket files) belongs to the claiming worker.
    pub fn drop_competing_state(listeners: &mut [Listener], claimed: usize) {
        for (index, listener) in listeners.iter_mut().enumerate() {
            if index != claimed {
                listener.accepting = false;
                listener.socket = None;
            }
        }
    }

    /// Register the accept fd with the worker's event loop.
    pub fn resume_accept(&mut self, ev: &mut dyn EventLoop, token: Token) -> Result<(), ListenerError> {
        let fd = self.raw_fd().ok_or_else(|| ListenerError::NotBuilt {
            name: self.name.clone(),
        })?;
        if !self.accepting {
            ev.watch_read(fd, token);
            self.accepting = true;
        }
        Ok(())
    }

    /// Unregister the accept fd from the worker's event loop.
    pub fn pause_accept(&mut self, ev: &mut dyn EventLoop) {
        if self.accepting {
            if let Some(fd) = self.raw_fd() {
                ev.unwatch_read(fd);
            }
            self.accepting = false;
        }
    }

    /// Close the listening socket. Idempotent.
    pub fn teardown(&mut self) {
        self.accepting = false;
        if self.socket.take().is_some() && self.transport == Transport::Unix {
            let _ = std::fs::remove_file(PathBuf::from(&self.address));
        }
    }

    pub fn raw_fd(&self) -> Option<RawFd> {
        match &self.socket {
            Some(BoundSocket::Tcp(s)) => Some(s.as_raw_fd()),
            Some(BoundSocket::Udp(s)) => Some(s.as_raw_fd()),
            Some(BoundSocket::Unix(s)) => Some(s.as_raw_fd()),
            None => None,
        }
    }

    /// Non-blocking accept. `Ok(None)` on `EAGAIN` — under a shared
    /// (`reuse_port`) listener another worker may have won the connection.
    pub fn accept(&mut self, id: ConnectionId) -> io::Result<Option<Connection>> {
        match &self.socket {
            Some(BoundSocket::Tcp(listener)) => match listener.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(true)?;
                    if self.context.tcp_nodelay {
                        let _ = stream.set_nodelay(true);
                    }
                    Ok(Some(self.wrap_stream(id, ConnStream::Tcp(stream), peer.to_string())))
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
                Err(e) => Err(e),
            },
            Some(BoundSocket::Unix(listener)) => match listener.accept() {
                Ok((stream, _)) => {
                    stream.set_nonblocking(true)?;
                    let peer = self.address.clone();
                    Ok(Some(self.wrap_stream(id, ConnStream::Unix(stream), peer)))
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
                Err(e) => Err(e),
            },
            Some(BoundSocket::Udp(_)) | None => Ok(None),
        }
    }

    /// Non-blocking datagram read; invokes the on-datagram callback.
    /// `Ok(false)` on `EAGAIN`.
    pub fn recv_datagram(&self, buf: &mut [u8]) -> io::Result<bool> {
        let Some(BoundSocket::Udp(socket)) = &self.socket else {
            return Ok(false);
        };
        match socket.recv_from(buf) {
            Ok((len, peer)) => {
                if let Some(cb) = &self.on_datagram {
                    cb(socket, peer, &buf[..len]);
                }
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn connect_callback(&self) -> Option<&ConnectCallback> {
        self.on_connect.as_ref()
    }

    pub fn message_callback(&self) -> Option<&MessageCallback> {
        self.on_message.as_ref()
    }

    fn wrap_stream(&self, id: ConnectionId, stream: ConnStream, peer: String) -> Connection {
        Connection::new(id, stream, peer, self.protocol, self.transport)
    }

    fn bind_socket(&mut self, reuse_port: bool) -> Result<(), ListenerError> {
        match self.transport {
            Transport::Tcp | Transport::Ssl => {
                let addr = self.resolve_addr()?;
                let socket = self
                    .stream_socket(addr, Type::STREAM, reuse_port)
                    .and_then(|socket| {
                        socket.listen(self.context.backlog)?;
                        Ok(socket)
                    })
                    .map_err(|source| self.bind_err(source))?;
                let listener: TcpListener = socket.into();
                if let Ok(local) = listener.local_addr() {
                    self.address = local.to_string();
                }
                self.socket = Some(BoundSocket::Tcp(listener));
            }
            Transport::Udp => {
                let addr = self.resolve_addr()?;
                let socket = self
                    .stream_socket(addr, Type::DGRAM, reuse_port)
                    .map_err(|source| self.bind_err(source))?;
                let socket: UdpSocket = socket.into();
                if let Ok(local) = socket.local_addr() {
                    self.address = local.to_string();
                }
                self.socket = Some(BoundSocket::Udp(socket));
            }
            Transport::Unix => {
                let path = PathBuf::from(&self.address);
                if path.exists() {
                    std::fs::remove_file(&path).map_err(|source| self.bind_err(source))?;
                }
                let listener = UnixListener::bind(&path).map_err(|source| self.bind_err(source))?;
                listener
                    .set_nonblocking(true)
                    .map_err(|source| self.bind_err(source))?;
                self.socket = Some(BoundSocket::Unix(listener));
            }
        }
        Ok(())
    }

    fn stream_socket(
        &self,
        addr: SocketAddr,
        kind: Type,
        reuse_port: bool,
    ) -> io::Result<Socket> {
        let domain = Domain::for_address(addr);
        let socket = Socket::new(domain, kind, None)?;
        if self.context.reuse_addr {
            socket.set_reuse_address(true)?;
        }
        if reuse_port {
            socket.set_reuse_port(true)?;
        }
        if kind == Type::STREAM {
            if let Some(interval) = self.context.keepalive {
                let keepalive = socket2::TcpKeepalive::new().with_time(interval);
                socket.set_tcp_keepalive(&keepalive)?;
            }
        }
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        Ok(socket)
    }

    fn resolve_addr(&self) -> Result<SocketAddr, ListenerError> {
        self.address
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| ListenerError::Address {
                address: self.address.clone(),
            })
    }

    fn bind_err(&self, source: io::Error) -> ListenerError {
        ListenerError::Bind {
            address: format!("{}://{}", self.transport.scheme(), self.address),
            source,
        }
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
