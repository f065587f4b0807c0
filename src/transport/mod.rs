/*!
# Transport Module

This module provides the [`Transport`] trait, the abstract byte-stream
capability that every other component in this crate is ultimately built on
top of (directly or, in the case of the mount proxy, by wrapping one).

## Overview

A transport is nothing more than a bidirectional byte stream with a bounded
read primitive:
- `read` blocks for at most `timeout`, returning whatever bytes arrived (an
  empty vector is a legal, non-error "nothing arrived in time" result).
- `write` blocks until the given bytes are handed to the underlying link.
- `close` releases the underlying handle.
- `set_dtr`/`set_rts`/`reconnect` are optional capabilities; transports that
  don't support them return [`std::io::ErrorKind::Unsupported`].

This crate ships two concrete transports, [`serial::SerialTransport`] and
[`tcp::TcpTransport`], plus the mount subsystem's demultiplexing wrapper
(see [`crate::mount::proxy::InterceptingTransport`]), which forwards
everything except `read` to an inner transport.
*/

use std::io;
use std::time::Duration;

pub mod serial;
pub mod tcp;

/// Abstract bidirectional byte stream.
///
/// Implementors are not required to be `Sync`; a [`crate::session::Session`]
/// owns its transport exclusively and serialises access through the write
/// guard described in the REPL engine.
pub trait Transport: Send {
    /// Read whatever bytes are available, blocking for at most `timeout`.
    ///
    /// Returning `Ok(vec![])` after the timeout elapses with no data is not
    /// an error; callers (the line discipline) loop on this until their own
    /// deadline expires.
    fn read(&mut self, timeout: Duration) -> io::Result<Vec<u8>>;

    /// Write the full contents of `buf`, blocking until accepted by the link.
    fn write(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Release the underlying handle. Idempotent.
    fn close(&mut self) -> io::Result<()>;

    /// Toggle the DTR control line, if the transport exposes one.
    fn set_dtr(&mut self, _on: bool) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    /// Toggle the RTS control line, if the transport exposes one.
    fn set_rts(&mut self, _on: bool) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    /// Re-open the same underlying endpoint, retrying until `timeout` elapses.
    ///
    /// Used after a machine reset on links that physically re-enumerate
    /// (USB-CDC boards vanish and reappear; TCP tunnels usually don't need
    /// this, but a re-dial is harmless).
    fn reconnect(&mut self, _timeout: Duration) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
}

/// Placeholder transport that errors on every I/O call. Used only as the
/// momentary value left behind while [`crate::line::LineDiscipline::replace_transport`]
/// swaps a real transport for a wrapped one (the mount subsystem's
/// [`crate::mount::proxy::InterceptingTransport`]) — never reachable from a
/// caller in practice, since the swap is a single uninterrupted operation.
pub struct ClosedTransport;

impl Transport for ClosedTransport {
    fn read(&mut self, _timeout: Duration) -> io::Result<Vec<u8>> {
        Err(io::Error::new(io::ErrorKind::NotConnected, "transport not installed"))
    }

    fn write(&mut self, _buf: &[u8]) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::NotConnected, "transport not installed"))
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for Box<dyn Transport> {
    fn read(&mut self, timeout: Duration) -> io::Result<Vec<u8>> {
        (**self).read(timeout)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        (**self).write(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }

    fn set_dtr(&mut self, on: bool) -> io::Result<()> {
        (**self).set_dtr(on)
    }

    fn set_rts(&mut self, on: bool) -> io::Result<()> {
        (**self).set_rts(on)
    }

    fn reconnect(&mut self, timeout: Duration) -> io::Result<()> {
        (**self).reconnect(timeout)
    }
}
