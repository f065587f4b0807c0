//! TCP transport for a REPL exposed over a network tunnel.

use super::Transport;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Default port for a TCP-tunnelled REPL (the traditional telnet port; no
/// in-band framing beyond the REPL protocol itself is added here).
pub const DEFAULT_PORT: u16 = 23;

/// A TCP-tunnelled byte stream to the device. Has no control lines.
pub struct TcpTransport {
    address: String,
    inner: TcpStream,
}

impl TcpTransport {
    /// Connect to `address` (`host:port`).
    pub fn connect(address: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(address)?;
        stream.set_nodelay(true)?;
        Ok(TcpTransport {
            address: address.to_string(),
            inner: stream,
        })
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, timeout: Duration) -> io::Result<Vec<u8>> {
        self.inner.set_read_timeout(Some(timeout))?;
        let mut buf = [0u8; 4096];
        match self.inner.read(&mut buf) {
            Ok(0) => Ok(Vec::new()),
            Ok(n) => Ok(buf[..n].to_vec()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Vec::new()),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.inner.write_all(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        self.inner.shutdown(std::net::Shutdown::Both)
    }

    fn reconnect(&mut self, timeout: Duration) -> io::Result<()> {
        let addrs: Vec<_> = self.address.to_socket_addrs()?.collect();
        if addrs.is_empty() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no addresses resolved"));
        }
        let deadline = std::time::Instant::now() + timeout;
        loop {
            match TcpStream::connect(addrs[0]) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    self.inner = stream;
                    return Ok(());
                }
                Err(e) if std::time::Instant::now() >= deadline => return Err(e),
                Err(_) => std::thread::sleep(Duration::from_millis(100)),
            }
        }
    }
}
