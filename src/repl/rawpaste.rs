//! Raw-paste: a flow-controlled variant of raw-REPL code submission for
//! large payloads, probed for and used transparently by
//! [`super::ReplEngine::try_raw_paste`].

use crate::error::{Error, Result};
use crate::line::{Deadline, LineDiscipline};
use crate::repl::ctrl;
use crate::transport::Transport;

const PROBE: &[u8] = &[0x05, b'A', 0x01];

/// Result of a successful raw-paste transfer (before stdout/stderr collection).
#[derive(Debug, PartialEq, Eq)]
pub enum RawPasteOutcome {
    /// All code was sent and `Ctrl-D` (end-of-data) was written.
    Sent,
    /// The device sent `\x03`, aborting the transfer mid-flight.
    Aborted,
}

/// Send the three-byte raw-paste probe and report whether the device
/// supports it. Does not touch `state`; callers cache the result.
pub fn probe<T: Transport>(line: &mut LineDiscipline<T>, deadline: Deadline) -> Result<bool> {
    line.write(PROBE)?;
    let (_, found_r) = line.read_until(b"R", deadline)?;
    if !found_r {
        return Err(Error::ProtocolTimeout {
            expected: "raw-paste probe reply",
        });
    }
    let reply = read_n(line, 1, deadline)?;
    match reply[0] {
        0x00 => Ok(false),
        0x01 => {
            // window size (u16 LE) + trailing 0x01 follow; consumed by `transfer`.
            Ok(true)
        }
        other => Err(Error::desync(format!(
            "unexpected raw-paste probe byte {other:#x}"
        ))),
    }
}

/// Run a full raw-paste transfer of `code`, having already probed support.
///
/// Re-issues the probe (cheap, three bytes) so the window size is read
/// fresh for every transfer, then flow-controls the write using the
/// device-advertised window.
pub fn transfer<T: Transport>(
    line: &mut LineDiscipline<T>,
    code: &[u8],
    deadline: Deadline,
) -> Result<RawPasteOutcome> {
    line.write(PROBE)?;
    let (_, found_r) = line.read_until(b"R", deadline)?;
    if !found_r {
        return Err(Error::ProtocolTimeout {
            expected: "raw-paste probe reply",
        });
    }
    let header = read_n(line, 4, deadline)?;
    if header[0] != 0x01 {
        return Err(Error::CapabilityUnavailable {
            feature: "raw-paste",
        });
    }
    let window_size = u16::from_le_bytes([header[1], header[2]]) as i64;
    if header[3] != 0x01 {
        return Err(Error::desync("malformed raw-paste window header"));
    }

    let mut credit = window_size;
    let mut sent = 0usize;

    while sent < code.len() {
        if credit <= 0 {
            let byte = read_n(line, 1, deadline)?[0];
            match byte {
                ctrl::CTRL_A => credit += window_size,
                0x03 => return Ok(RawPasteOutcome::Aborted),
                other => {
                    return Err(Error::desync(format!(
                        "unexpected byte {other:#x} waiting for raw-paste credit"
                    )))
                }
            }
            continue;
        }
        let take = (credit as usize).min(code.len() - sent);
        line.write(&code[sent..sent + take])?;
        sent += take;
        credit -= take as i64;
    }
    // The terminating Ctrl-D is itself one byte of window-controlled data: a
    // code unit that exactly exhausts the window must still wait for one
    // more credit before it may be sent.
    if credit <= 0 {
        let byte = read_n(line, 1, deadline)?[0];
        match byte {
            ctrl::CTRL_A => credit += window_size,
            0x03 => return Ok(RawPasteOutcome::Aborted),
            other => {
                return Err(Error::desync(format!(
                    "unexpected byte {other:#x} waiting for raw-paste credit"
                )))
            }
        }
    }
    line.write(&[ctrl::CTRL_D])?;
    let _ = credit;
    Ok(RawPasteOutcome::Sent)
}

/// Read exactly `n` bytes (small protocol headers only; not for bulk data).
fn read_n<T: Transport>(line: &mut LineDiscipline<T>, n: usize, deadline: Deadline) -> Result<Vec<u8>> {
    line.read_exact(n, deadline)?.ok_or(Error::ProtocolTimeout {
        expected: "raw-paste protocol byte(s)",
    })
}
