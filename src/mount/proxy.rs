//! Host-side demultiplexing transport (C6).
//!
//! Wraps an inner [`Transport`] and splits its read stream into ordinary
//! REPL output (forwarded untouched, in order, exactly once) and VFS frames
//! (serviced against a [`MountTable`] with the reply written straight back
//! to the inner transport). Never constructed standalone — a [`Session`]
//! installs one the moment its first mount goes live.
//!
//! [`Session`]: crate::session::Session

use super::frame::{next_step, DemuxStep, Frame, VfsErrorCode};
use super::vfs::MountTable;
use crate::transport::Transport;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Demultiplexes every live mount's traffic off one transport. The device
/// agent stamps its mount's index as the first byte of every request
/// payload (see [`super::device_agent`]); that byte is stripped here and
/// used to look up which [`super::vfs::Mount`] the rest of the payload is
/// actually for, so an arbitrary number of simultaneous mounts can share
/// the one stdin/stdout stream without cross-talk.
pub struct InterceptingTransport<T: Transport> {
    inner: T,
    buf: Vec<u8>,
    mounts: Arc<Mutex<MountTable>>,
}

impl<T: Transport> InterceptingTransport<T> {
    pub fn new(inner: T, mounts: Arc<Mutex<MountTable>>) -> Self {
        InterceptingTransport {
            inner,
            buf: Vec::new(),
            mounts,
        }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    fn service(&mut self, frame: Frame) -> io::Result<()> {
        let reply = if frame.payload.is_empty() {
            Frame::error(VfsErrorCode::Other, "empty request frame")
        } else {
            let index = frame.payload[0];
            let rest = Frame {
                kind: frame.kind,
                payload: frame.payload[1..].to_vec(),
            };
            let mut mounts = self.mounts.lock().unwrap_or_else(|e| e.into_inner());
            match mounts.mount_point_for_index(index).map(str::to_string) {
                Some(mount_point) => mounts.handle(&mount_point, &rest),
                None => Frame::error(VfsErrorCode::NotFound, "no such mount"),
            }
        };
        self.inner.write(&reply.encode())
    }
}

impl<T: Transport> Transport for InterceptingTransport<T> {
    fn read(&mut self, timeout: Duration) -> io::Result<Vec<u8>> {
        let chunk = self.inner.read(timeout)?;
        self.buf.extend_from_slice(&chunk);

        let mut output = Vec::new();
        loop {
            match next_step(&mut self.buf) {
                DemuxStep::Output(bytes) => output.extend_from_slice(&bytes),
                DemuxStep::Frame(frame) => {
                    log::debug!("servicing VFS frame kind {:#04x}", frame.kind);
                    self.service(frame)?;
                }
                DemuxStep::Pending => break,
            }
        }
        Ok(output)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.inner.write(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        self.inner.close()
    }

    fn set_dtr(&mut self, on: bool) -> io::Result<()> {
        self.inner.set_dtr(on)
    }

    fn set_rts(&mut self, on: bool) -> io::Result<()> {
        self.inner.set_rts(on)
    }

    fn reconnect(&mut self, timeout: Duration) -> io::Result<()> {
        self.inner.reconnect(timeout)
    }
}
