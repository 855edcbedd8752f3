use std::{
    io,
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

use bytes::Bytes;
use scpi_protocol::{
    Error, Result, SentinelFramer,
    framing::{UnitReader, write_unit},
};

/// Sends units to an instrument and receives its replies.
///
/// Implementations add and strip the sentinel. A read or write that times out must be reported
/// as [`Error::Timeout`] so that queries can be retried.
pub trait Transport {
    /// Sends `request`, then returns the next unit received if `expect_response` is set.
    fn send_receive(&mut self, request: &[u8], expect_response: bool) -> Result<Option<Bytes>>;

    /// Drops any reply still owed for an earlier request.
    ///
    /// Called after a timeout, so that a late reply is never taken as the answer to the next
    /// request.
    fn reset(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send_receive(&mut self, request: &[u8], expect_response: bool) -> Result<Option<Bytes>> {
        (**self).send_receive(request, expect_response)
    }

    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send_receive(&mut self, request: &[u8], expect_response: bool) -> Result<Option<Bytes>> {
        (**self).send_receive(request, expect_response)
    }

    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }
}

/// Blocking TCP transport.
///
/// A reset closes the connection and opens a new one to the same peer.
#[derive(Debug)]
pub struct TcpTransport {
    tcp: TcpStream,
    peer: SocketAddr,
    reader: UnitReader,
    timeout: Duration,
}

impl TcpTransport {
    /// Connects to `addr`, using `timeout` for the connection attempt and every read and write.
    pub fn connect(
        addr: impl ToSocketAddrs,
        timeout: Duration,
        sentinel: impl AsRef<[u8]>,
    ) -> Result<TcpTransport> {
        let mut last_error = None;
        for addr in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(tcp) => {
                    log::info!("Connected to {}", addr);
                    return TcpTransport::new(tcp, timeout, SentinelFramer::new(sentinel));
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(map_timeout(
            last_error.unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "Address resolved to nothing")
            }),
            timeout,
        ))
    }

    /// Wraps an established connection.
    pub fn new(tcp: TcpStream, timeout: Duration, framer: SentinelFramer) -> Result<TcpTransport> {
        configure(&tcp, timeout)?;
        Ok(TcpTransport {
            peer: tcp.peer_addr()?,
            tcp,
            reader: UnitReader::new(framer),
            timeout,
        })
    }
}

fn configure(tcp: &TcpStream, timeout: Duration) -> io::Result<()> {
    tcp.set_read_timeout(Some(timeout))?;
    tcp.set_write_timeout(Some(timeout))?;
    tcp.set_nodelay(true)
}

impl Transport for TcpTransport {
    fn send_receive(&mut self, request: &[u8], expect_response: bool) -> Result<Option<Bytes>> {
        log::trace!("Sending {:02x?}", request);
        write_unit(&mut self.tcp, request, self.reader.framer().sentinel())
            .map_err(|e| map_timeout(e, self.timeout))?;
        if !expect_response {
            return Ok(None);
        }
        let unit = self.reader.read_unit(&mut self.tcp).map_err(|e| match e {
            Error::Io(e) => map_timeout(e, self.timeout),
            other => other,
        })?;
        log::trace!("Received {:02x?}", &unit[..]);
        Ok(Some(unit))
    }

    fn reset(&mut self) -> Result<()> {
        log::info!("Reconnecting to {} to drop late replies", self.peer);
        let tcp = TcpStream::connect_timeout(&self.peer, self.timeout)
            .map_err(|e| map_timeout(e, self.timeout))?;
        configure(&tcp, self.timeout)?;
        self.tcp = tcp;
        self.reader.clear();
        Ok(())
    }
}

fn map_timeout(e: io::Error, timeout: Duration) -> Error {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::Timeout(timeout),
        _ => Error::Io(e),
    }
}
