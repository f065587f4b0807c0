/*!
# REPL Protocol Engine

This module drives the device's interpreter between its friendly-REPL and
raw-REPL modes, submits code units, and captures their output.

## States

```text
Unknown --(enter)--> Raw <--(exit/enter)--> Friendly
  Raw --(soft_reset)--> Raw
  Friendly --(soft_reset)--> Friendly
  Raw --(enter raw-paste probe)--> RawPaste --(end of data)--> Raw
```

`Closed` is reached only by `machine_reset`, and only until `reconnect`
brings the engine back to `Unknown`.
*/

mod rawpaste;

use crate::error::{Error, Result};
use crate::line::{Deadline, LineDiscipline};
use crate::transport::Transport;
use std::time::{Duration, Instant};

pub use rawpaste::RawPasteOutcome;

/// Device-side control bytes. Names follow the banners/prompts they trigger.
pub mod ctrl {
    pub const CTRL_A: u8 = 0x01;
    pub const CTRL_B: u8 = 0x02;
    pub const CTRL_C: u8 = 0x03;
    pub const CTRL_D: u8 = 0x04;
}

/// The friendly-REPL prompt.
pub const FRIENDLY_PROMPT: &[u8] = b">>> ";
/// The raw-REPL entry banner.
pub const RAW_BANNER: &[u8] = b"raw REPL; CTRL-B to exit\r\n>";

const ENTRY_RETRIES: u32 = 3;

/// Where the engine currently is in the state diagram above.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplState {
    /// Nothing has been negotiated yet (fresh session, or post soft-reset-of-unknown-origin).
    Unknown,
    /// The device is at the human `">>> "` prompt.
    Friendly,
    /// The device is in raw REPL, idle and ready for the next code unit.
    Raw,
    /// A raw-paste transfer is in progress; only `rawpaste` submodule code
    /// touches the transport in this state.
    RawPaste,
    /// The transport has been closed by `machine_reset` and not yet reconnected.
    Closed,
}

/// The result of executing one code unit.
#[derive(Debug, Default, Clone)]
pub struct ExecOutput {
    /// Bytes printed to stdout by the code unit.
    pub stdout: Vec<u8>,
}

/// A state machine that drives one device's interpreter over one transport.
pub struct ReplEngine<T: Transport> {
    line: LineDiscipline<T>,
    state: ReplState,
    raw_paste_supported: Option<bool>,
}

impl<T: Transport> ReplEngine<T> {
    /// Wrap a freshly opened transport. The engine starts in [`ReplState::Unknown`].
    pub fn new(transport: T) -> Self {
        ReplEngine {
            line: LineDiscipline::new(transport),
            state: ReplState::Unknown,
            raw_paste_supported: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> ReplState {
        self.state
    }

    /// Access the line discipline, e.g. so the mount proxy can swap in an
    /// intercepting transport around the same buffered stream.
    pub fn line_mut(&mut self) -> &mut LineDiscipline<T> {
        &mut self.line
    }

    /// Borrow the underlying transport directly (control lines, reconnect).
    pub fn transport_mut(&mut self) -> &mut T {
        self.line.transport()
    }

    /// Swap in a new transport, returning the one previously installed.
    /// See [`LineDiscipline::replace_transport`].
    pub fn replace_transport(&mut self, new: T) -> T {
        self.line.replace_transport(new)
    }

    /// Enter raw REPL from any state, interrupting whatever is running.
    ///
    /// Sends one `Ctrl-C`, ensures friendly mode, then `Ctrl-A` and waits for
    /// the raw banner. Retries the `Ctrl-C Ctrl-C`-then-`Ctrl-A` sequence up
    /// to [`ENTRY_RETRIES`] times before giving up with [`Error::ProtocolDesync`].
    pub fn enter_raw(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Deadline::after(timeout);
        self.line.write(&[ctrl::CTRL_C])?;
        self.line.read_available()?;
        self.line.write(&[ctrl::CTRL_B])?;
        let _ = self.line.read_until(FRIENDLY_PROMPT, deadline)?;

        for attempt in 0..ENTRY_RETRIES {
            self.line.write(&[ctrl::CTRL_A])?;
            let (_, found) = self.line.read_until(RAW_BANNER, deadline)?;
            if found {
                self.state = ReplState::Raw;
                log::info!("entered raw REPL");
                return Ok(());
            }
            log::warn!("raw REPL banner not seen, retry {attempt}");
            self.line.write(&[ctrl::CTRL_C, ctrl::CTRL_C])?;
            self.line.drain(Duration::from_millis(200))?;
        }
        Err(Error::desync("raw REPL banner never appeared"))
    }

    /// Leave raw REPL for friendly mode.
    pub fn exit_raw(&mut self, timeout: Duration) -> Result<()> {
        self.line.write(&[ctrl::CTRL_B])?;
        let (_, found) = self.line.read_until(FRIENDLY_PROMPT, Deadline::after(timeout))?;
        if !found {
            return Err(Error::ProtocolTimeout {
                expected: "friendly prompt",
            });
        }
        self.state = ReplState::Friendly;
        Ok(())
    }

    /// Execute `code` in raw REPL and collect its stdout.
    ///
    /// `timeout == Duration::ZERO` means fire-and-forget: the code is
    /// written, the echoed `OK` is discarded, and the call returns
    /// immediately without waiting for output.
    pub fn exec_raw(&mut self, code: &[u8], timeout: Duration) -> Result<ExecOutput> {
        debug_assert_eq!(self.state, ReplState::Raw);
        self.line.write(code)?;
        self.line.write(&[ctrl::CTRL_D])?;

        if timeout.is_zero() {
            let deadline = Deadline::after(Duration::from_secs(2));
            let (_, found) = self.line.read_until(b"OK", deadline)?;
            if !found {
                return Err(Error::ProtocolTimeout { expected: "OK" });
            }
            return Ok(ExecOutput::default());
        }

        let deadline = Deadline::after(timeout);
        let (ok_prefixed, found) = self.line.read_until(b"OK", deadline)?;
        if !found {
            return Err(Error::ProtocolTimeout { expected: "OK" });
        }
        // Anything before the literal `OK` that isn't part of it is a desync;
        // MicroPython emits `OK` immediately after accepting the code.
        if !ok_prefixed.is_empty() {
            log::warn!("{} stray bytes before OK", ok_prefixed.len());
        }

        let (stdout, found) = self.line.read_until(&[ctrl::CTRL_D], deadline)?;
        if !found {
            return Err(Error::ProtocolTimeout {
                expected: "end of stdout",
            });
        }

        let (stderr, found) = self.line.read_until(&[ctrl::CTRL_D], deadline)?;
        if !found {
            return Err(Error::ProtocolTimeout {
                expected: "end of stderr",
            });
        }

        // Trailing `>` returns the engine to idle-within-raw.
        let (_, _) = self.line.read_until(b">", deadline)?;

        if !stderr.is_empty() {
            return Err(Error::CmdError {
                cmd: String::from_utf8_lossy(code).into_owned(),
                partial_stdout: stdout,
                stderr_text: String::from_utf8_lossy(&stderr).into_owned(),
            });
        }

        Ok(ExecOutput { stdout })
    }

    /// Execute via raw-paste if the device supports it (cached after the
    /// first probe), else transparently fall back to [`Self::exec_raw`].
    pub fn try_raw_paste(&mut self, code: &[u8], timeout: Duration) -> Result<ExecOutput> {
        let supported = match self.raw_paste_supported {
            Some(s) => s,
            None => {
                let s = rawpaste::probe(&mut self.line, Deadline::after(timeout))?;
                self.raw_paste_supported = Some(s);
                s
            }
        };
        if !supported {
            return self.exec_raw(code, timeout);
        }
        match rawpaste::transfer(&mut self.line, code, Deadline::after(timeout))? {
            RawPasteOutcome::Aborted => Err(Error::desync("device aborted raw-paste")),
            RawPasteOutcome::Sent => self.collect_after_raw_paste(code, timeout),
        }
    }

    fn collect_after_raw_paste(&mut self, code: &[u8], timeout: Duration) -> Result<ExecOutput> {
        let deadline = Deadline::after(timeout);
        let (stdout, found) = self.line.read_until(&[ctrl::CTRL_D], deadline)?;
        if !found {
            return Err(Error::ProtocolTimeout {
                expected: "end of stdout",
            });
        }
        let (stderr, found) = self.line.read_until(&[ctrl::CTRL_D], deadline)?;
        if !found {
            return Err(Error::ProtocolTimeout {
                expected: "end of stderr",
            });
        }
        let _ = self.line.read_until(b">", deadline)?;
        if !stderr.is_empty() {
            return Err(Error::CmdError {
                cmd: String::from_utf8_lossy(code).into_owned(),
                partial_stdout: stdout,
                stderr_text: String::from_utf8_lossy(&stderr).into_owned(),
            });
        }
        Ok(ExecOutput { stdout })
    }

    /// Soft-reset the interpreter. In [`ReplState::Friendly`] this runs boot
    /// scripts; in [`ReplState::Raw`] it does not. Either way the helper
    /// cache, capability cache and raw-paste support flag must be
    /// invalidated by the caller (the [`crate::session::Session`] does this).
    pub fn soft_reset(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Deadline::after(timeout);
        match self.state {
            ReplState::Friendly => {
                self.line.write(&[ctrl::CTRL_D])?;
                let (_, found) = self.line.read_until(FRIENDLY_PROMPT, deadline)?;
                if !found {
                    return Err(Error::ProtocolTimeout {
                        expected: "friendly prompt after soft reset",
                    });
                }
            }
            ReplState::Raw => {
                self.line.write(&[ctrl::CTRL_D])?;
                let (_, found) = self.line.read_until(RAW_BANNER, deadline)?;
                if !found {
                    return Err(Error::ProtocolTimeout {
                        expected: "raw banner after soft reset",
                    });
                }
            }
            other => {
                return Err(Error::desync(format!(
                    "soft reset requires Friendly or Raw state, was {other:?}"
                )))
            }
        }
        self.raw_paste_supported = None;
        Ok(())
    }

    /// Interrupt whatever is running and return to the friendly prompt.
    /// Safe to call at any time; does not touch any other session state.
    pub fn stop(&mut self) -> Result<()> {
        self.line.write(&[ctrl::CTRL_C, ctrl::CTRL_C])?;
        let deadline = Deadline::after(Duration::from_secs(5));
        let (_, found) = self.line.read_until(FRIENDLY_PROMPT, deadline)?;
        self.state = ReplState::Friendly;
        if !found {
            return Err(Error::ProtocolTimeout {
                expected: "friendly prompt after stop",
            });
        }
        Ok(())
    }

    /// Submit `import machine; machine.reset()` fire-and-forget, close the
    /// transport, then loop `reconnect` until `reconnect_timeout` elapses.
    /// On success the engine is back in [`ReplState::Unknown`].
    pub fn machine_reset(&mut self, reconnect_timeout: Duration) -> Result<()> {
        if self.state != ReplState::Raw {
            self.enter_raw(Duration::from_secs(5))?;
        }
        let _ = self.exec_raw(b"import machine; machine.reset()", Duration::ZERO)?;
        self.line.transport().close()?;
        self.state = ReplState::Closed;

        let started = Instant::now();
        self.line
            .transport()
            .reconnect(reconnect_timeout)
            .map_err(Error::Transport)?;
        log::info!("reconnected after machine reset in {:?}", started.elapsed());
        self.state = ReplState::Unknown;
        self.raw_paste_supported = None;
        Ok(())
    }
}
