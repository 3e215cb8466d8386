// SPDX-License-Identifier: MIT

//! Accepted-connection handle.
//!
//! The core tags a connection with its listener's transport and protocol
//! and tracks it for drain accounting; byte-level protocol handling
//! belongs to the application callbacks. Streams are non-blocking, so
//! outbound writes the socket refuses are buffered here and pushed out
//! again when the worker's loop reports the fd writable.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

use crate::listener::{ProtocolTag, Transport};

pub type ConnectionId = u64;

/// The stream kinds a listener can accept.
pub enum ConnStream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

pub struct Connection {
    id: ConnectionId,
    stream: ConnStream,
    peer: String,
    protocol: ProtocolTag,
    transport: Transport,
    outbound: Vec<u8>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        stream: ConnStream,
        peer: String,
        protocol: ProtocolTag,
        transport: Transport,
    ) -> Self {
        Self {
            id,
            stream,
            peer,
            protocol,
            transport,
            outbound: Vec::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn protocol(&self) -> ProtocolTag {
        self.protocol
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn raw_fd(&self) -> RawFd {
        match &self.stream {
            ConnStream::Tcp(s) => s.as_raw_fd(),
            ConnStream::Unix(s) => s.as_raw_fd(),
        }
    }

    /// Non-blocking read. `Ok(0)` means the peer closed.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.stream {
            ConnStream::Tcp(s) => s.read(buf),
            ConnStream::Unix(s) => s.read(buf),
        }
    }

    /// Queue `data` for the peer, transmitting whatever the socket
    /// accepts right now. The remainder stays buffered; the worker
    /// flushes it once the fd polls writable.
    pub fn send(&mut self, data: &[u8]) -> io::Result<()> {
        if self.outbound.is_empty() {
            let sent = self.write_now(data)?;
            self.outbound.extend_from_slice(&data[sent..]);
        } else {
            // Already backed up; keep the byte order.
            self.outbound.extend_from_slice(data);
        }
        Ok(())
    }

    /// Push buffered bytes out; whatever the socket still refuses stays
    /// queued for the next writable tick.
    pub fn flush_outbound(&mut self) -> io::Result<()> {
        if self.outbound.is_empty() {
            return Ok(());
        }
        let mut queued = std::mem::take(&mut self.outbound);
        match self.write_now(&queued) {
            Ok(sent) => {
                queued.drain(..sent);
                self.outbound = queued;
                Ok(())
            }
            Err(e) => {
                self.outbound = queued;
                Err(e)
            }
        }
    }

    /// Whether buffered output is waiting on the socket.
    pub fn has_outbound(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// Write until the socket pushes back; returns how much it took.
    fn write_now(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut sent = 0;
        while sent < data.len() {
            let result = match &mut self.stream {
                ConnStream::Tcp(s) => s.write(&data[sent..]),
                ConnStream::Unix(s) => s.write(&data[sent..]),
            };
            match result {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => sent += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(sent)
    }

    /// Shut both directions down; the fd closes when the handle drops.
    pub fn force_close(&mut self) {
        let _ = match &self.stream {
            ConnStream::Tcp(s) => s.shutdown(Shutdown::Both),
            ConnStream::Unix(s) => s.shutdown(Shutdown::Both),
        };
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
