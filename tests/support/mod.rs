//! A scriptable fake device for the integration suite.
//!
//! No physical board is reachable from this repository, so every test
//! drives a [`FakeDeviceTransport`] instead of [`boardlink::transport::serial::SerialTransport`]
//! or [`boardlink::transport::tcp::TcpTransport`]. It implements
//! [`boardlink::transport::Transport`] directly (rather than spawning a
//! second thread to play "the device") by reacting synchronously inside
//! `write`: each call the engine makes corresponds to exactly one logical
//! protocol action (one control byte, one code unit, one `Ctrl-D`), so the
//! fake can queue the matching reply bytes for the next `read` before
//! returning.

use boardlink::transport::Transport;
use std::collections::VecDeque;
use std::io;
use std::time::Duration;

const CTRL_A: u8 = 0x01;
const CTRL_B: u8 = 0x02;
const CTRL_C: u8 = 0x03;
const CTRL_D: u8 = 0x04;
const FRIENDLY_PROMPT: &[u8] = b">>> ";
const RAW_BANNER: &[u8] = b"raw REPL; CTRL-B to exit\r\n>";
const RAW_PASTE_PROBE: &[u8] = &[0x05, b'A', 0x01];

#[derive(Clone, Copy, PartialEq, Eq)]
enum DeviceState {
    Friendly,
    Raw,
}

struct RawPasteSession {
    window_size: u16,
    credit: i64,
    received: Vec<u8>,
}

/// Maps a submitted code unit's bytes to `(stdout, stderr)`. `stderr`
/// non-empty models the device raising.
pub type Handler = Box<dyn FnMut(&[u8]) -> (Vec<u8>, Vec<u8>) + Send>;

pub struct FakeDeviceTransport {
    state: DeviceState,
    out: VecDeque<u8>,
    pending_code: Option<Vec<u8>>,
    raw_paste: Option<RawPasteSession>,
    supports_raw_paste: bool,
    raw_paste_window: u16,
    handler: Handler,
    closed: bool,
}

impl FakeDeviceTransport {
    /// A device that always runs `handler` for submitted code and declines
    /// raw-paste (the common case: exercises the transparent-downgrade path).
    pub fn new(handler: Handler) -> Self {
        FakeDeviceTransport {
            state: DeviceState::Friendly,
            out: VecDeque::new(),
            pending_code: None,
            raw_paste: None,
            supports_raw_paste: false,
            raw_paste_window: 64,
            handler,
            closed: false,
        }
    }

    /// Same, but the device accepts raw-paste with the given window size.
    pub fn with_raw_paste(handler: Handler, window_size: u16) -> Self {
        let mut t = FakeDeviceTransport::new(handler);
        t.supports_raw_paste = true;
        t.raw_paste_window = window_size;
        t
    }

    fn push(&mut self, bytes: &[u8]) {
        self.out.extend(bytes.iter().copied());
    }
}

impl Transport for FakeDeviceTransport {
    fn read(&mut self, _timeout: Duration) -> io::Result<Vec<u8>> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "fake device closed"));
        }
        Ok(self.out.drain(..).collect())
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "fake device closed"));
        }

        if self.raw_paste.is_some() {
            if buf == [CTRL_D] {
                let session = self.raw_paste.take().unwrap();
                let (stdout, stderr) = (self.handler)(&session.received);
                self.push(&stdout);
                self.push(&[CTRL_D]);
                self.push(&stderr);
                self.push(&[CTRL_D]);
                self.push(b">");
                return Ok(());
            }
            let window_size;
            let exhausted;
            {
                let session = self.raw_paste.as_mut().unwrap();
                session.received.extend_from_slice(buf);
                session.credit -= buf.len() as i64;
                exhausted = session.credit <= 0;
                window_size = session.window_size;
            }
            if exhausted {
                if let Some(session) = self.raw_paste.as_mut() {
                    session.credit += window_size as i64;
                }
                self.push(&[CTRL_A]);
            }
            return Ok(());
        }

        match buf {
            [CTRL_C] => {}
            [CTRL_C, CTRL_C] => {
                self.push(FRIENDLY_PROMPT);
                self.state = DeviceState::Friendly;
            }
            [CTRL_B] => {
                self.push(FRIENDLY_PROMPT);
                self.state = DeviceState::Friendly;
            }
            [CTRL_A] => {
                self.push(RAW_BANNER);
                self.state = DeviceState::Raw;
            }
            [CTRL_D] => match self.pending_code.take() {
                Some(code) => {
                    let (stdout, stderr) = (self.handler)(&code);
                    self.push(b"OK");
                    self.push(&stdout);
                    self.push(&[CTRL_D]);
                    self.push(&stderr);
                    self.push(&[CTRL_D]);
                    self.push(b">");
                }
                None => match self.state {
                    DeviceState::Friendly => self.push(FRIENDLY_PROMPT),
                    DeviceState::Raw => self.push(RAW_BANNER),
                },
            },
            RAW_PASTE_PROBE => {
                self.push(b"R");
                if self.supports_raw_paste {
                    self.push(&[0x01]);
                    self.push(&self.raw_paste_window.to_le_bytes());
                    self.push(&[0x01]);
                    self.raw_paste = Some(RawPasteSession {
                        window_size: self.raw_paste_window,
                        credit: self.raw_paste_window as i64,
                        received: Vec::new(),
                    });
                } else {
                    self.push(&[0x00]);
                }
            }
            code => {
                self.pending_code = Some(code.to_vec());
            }
        }
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }

    fn reconnect(&mut self, _timeout: Duration) -> io::Result<()> {
        self.closed = false;
        self.state = DeviceState::Friendly;
        Ok(())
    }
}

/// A handler that always returns the same canned `(stdout, stderr)`.
pub fn canned(stdout: &'static [u8]) -> Handler {
    Box::new(move |_code| (stdout.to_vec(), Vec::new()))
}

/// A handler that raises (`stderr` non-empty) for every code unit.
pub fn always_raises(stderr: &'static str) -> Handler {
    Box::new(move |_code| (Vec::new(), stderr.as_bytes().to_vec()))
}

/// Build an engine already in [`boardlink::repl::ReplState::Raw`] over a
/// fresh [`FakeDeviceTransport`].
pub fn raw_engine(handler: Handler) -> boardlink::repl::ReplEngine<FakeDeviceTransport> {
    let mut engine = boardlink::repl::ReplEngine::new(FakeDeviceTransport::new(handler));
    engine.enter_raw(Duration::from_secs(2)).expect("enter_raw");
    engine
}
