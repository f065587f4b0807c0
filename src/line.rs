//! Line discipline (C2): a buffered, deadline-aware search primitive over a
//! [`Transport`]. This layer never interprets bytes — it only appends what
//! the transport hands back and scans for literal delimiter patterns.

use crate::transport::Transport;
use std::io;
use std::time::{Duration, Instant};

/// An absolute point in time to stop waiting, or "wait forever".
#[derive(Clone, Copy, Debug)]
pub enum Deadline {
    /// No time limit; used by interactive callers that are happy to block.
    Never,
    /// Stop waiting once this instant passes.
    At(Instant),
}

impl Deadline {
    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Deadline::At(Instant::now() + timeout)
    }

    fn remaining(self) -> Option<Duration> {
        match self {
            Deadline::Never => None,
            Deadline::At(at) => Some(at.saturating_duration_since(Instant::now())),
        }
    }

    fn expired(self) -> bool {
        matches!(self.remaining(), Some(d) if d.is_zero())
    }
}

/// Size of each blocking read issued to the transport while scanning.
const POLL_SLICE: Duration = Duration::from_millis(200);

/// Buffered read-with-deadline discipline over one transport.
///
/// Owns a growable buffer that every byte read from the transport is
/// appended to exactly once; `read_until` and `read_available` only ever
/// slice and drain that buffer, they never re-read bytes already seen.
pub struct LineDiscipline<T: Transport> {
    transport: T,
    buf: Vec<u8>,
}

impl<T: Transport> LineDiscipline<T> {
    /// Wrap `transport` in a fresh, empty line discipline.
    pub fn new(transport: T) -> Self {
        LineDiscipline {
            transport,
            buf: Vec::new(),
        }
    }

    /// Borrow the underlying transport (for control-line toggles, etc).
    pub fn transport(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume self and return the wrapped transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Swap in `new`, returning the previously wrapped transport. Used by
    /// the mount subsystem to insert/remove its demultiplexing wrapper
    /// around a session's boxed transport without disturbing the buffered
    /// bytes already read.
    pub fn replace_transport(&mut self, new: T) -> T {
        std::mem::replace(&mut self.transport, new)
    }

    /// Write `buf` straight through to the transport; no buffering on the
    /// write side.
    pub fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        log::trace!("write {} bytes", buf.len());
        self.transport.write(buf)
    }

    /// Read until `pattern` appears in the accumulated stream or `deadline`
    /// elapses.
    ///
    /// Returns the bytes that preceded the pattern (not including it) and
    /// whether the pattern was actually found. On a timeout, the bytes seen
    /// so far are returned with `false`; they remain consumed (not
    /// re-delivered by a later call) — callers that need to preserve
    /// unmatched bytes as output should capture this return value.
    pub fn read_until(&mut self, pattern: &[u8], deadline: Deadline) -> io::Result<(Vec<u8>, bool)> {
        loop {
            if let Some(idx) = find_subslice(&self.buf, pattern) {
                let before: Vec<u8> = self.buf.drain(..idx).collect();
                self.buf.drain(..pattern.len());
                return Ok((before, true));
            }
            if deadline.expired() {
                let before = std::mem::take(&mut self.buf);
                return Ok((before, false));
            }
            self.fill(deadline)?;
        }
    }

    /// Drain and return whatever bytes are currently buffered or arrive
    /// within one short poll slice, without searching for a pattern.
    pub fn read_available(&mut self) -> io::Result<Vec<u8>> {
        if self.buf.is_empty() {
            let chunk = self.transport.read(Duration::from_millis(20))?;
            self.buf.extend_from_slice(&chunk);
        }
        Ok(std::mem::take(&mut self.buf))
    }

    /// Read exactly `n` bytes, blocking (subject to `deadline`) until they
    /// arrive. Unlike [`Self::read_available`], any bytes read past `n` stay
    /// buffered for the next call instead of being handed back early —
    /// needed for fixed-size protocol headers (e.g. the raw-paste window)
    /// that may arrive coalesced with the bytes that follow them.
    pub fn read_exact(&mut self, n: usize, deadline: Deadline) -> io::Result<Option<Vec<u8>>> {
        loop {
            if self.buf.len() >= n {
                let rest = self.buf.split_off(n);
                let out = std::mem::replace(&mut self.buf, rest);
                return Ok(Some(out));
            }
            if deadline.expired() {
                return Ok(None);
            }
            self.fill(deadline)?;
        }
    }

    /// Discard input for `duration`, used to flush stray output after a
    /// cancellation.
    pub fn drain(&mut self, duration: Duration) -> io::Result<()> {
        let deadline = Deadline::after(duration);
        loop {
            if deadline.expired() {
                self.buf.clear();
                return Ok(());
            }
            self.fill(deadline)?;
            self.buf.clear();
        }
    }

    fn fill(&mut self, deadline: Deadline) -> io::Result<()> {
        let slice = match deadline.remaining() {
            Some(d) => d.min(POLL_SLICE),
            None => POLL_SLICE,
        };
        let chunk = self.transport.read(slice)?;
        if !chunk.is_empty() {
            log::trace!("read {} bytes", chunk.len());
            self.buf.extend_from_slice(&chunk);
        }
        Ok(())
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
