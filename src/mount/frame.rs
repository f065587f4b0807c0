//! VFS wire framing (C6): `[magic: 2][kind: 1][len: u32 LE][payload: len]`.
//!
//! The magic is chosen to be vanishingly unlikely inside printable REPL
//! stdout; a frame is only ever treated as protocol once its declared
//! length is fully present and its magic checks out, so a coincidental
//! magic byte pair in ordinary output degrades to being forwarded as output
//! rather than desyncing the session (see [`next_step`]).

pub const MAGIC: [u8; 2] = [0xF5, 0x5A];
const HEADER_LEN: usize = MAGIC.len() + 1 + 4;

/// Upper bound on a frame's declared payload length. Real VFS payloads never
/// exceed one file chunk (§4.4 caps those at 32 KiB); a header claiming more
/// than this can only be a magic byte pair that landed coincidentally inside
/// ordinary REPL output, not a real frame waiting to complete.
const MAX_FRAME_PAYLOAD: usize = 1 << 20;

/// Request kinds, sent device → host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Stat,
    ListDir,
    Open,
    Read,
    Close,
    Write,
    Remove,
    Mkdir,
    Rename,
}

impl RequestKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0x01 => RequestKind::Stat,
            0x02 => RequestKind::ListDir,
            0x03 => RequestKind::Open,
            0x04 => RequestKind::Read,
            0x05 => RequestKind::Close,
            0x06 => RequestKind::Write,
            0x07 => RequestKind::Remove,
            0x08 => RequestKind::Mkdir,
            0x09 => RequestKind::Rename,
            _ => return None,
        })
    }

    pub fn as_byte(self) -> u8 {
        match self {
            RequestKind::Stat => 0x01,
            RequestKind::ListDir => 0x02,
            RequestKind::Open => 0x03,
            RequestKind::Read => 0x04,
            RequestKind::Close => 0x05,
            RequestKind::Write => 0x06,
            RequestKind::Remove => 0x07,
            RequestKind::Mkdir => 0x08,
            RequestKind::Rename => 0x09,
        }
    }

    /// The reply kind that answers this request: the same byte with the
    /// high bit set, e.g. `Stat` (0x01) replies as 0x81.
    pub fn reply_byte(self) -> u8 {
        self.as_byte() | 0x80
    }
}

/// The one reply kind that never matches a request kind: a framed error.
pub const ERROR_REPLY_KIND: u8 = 0xFF;

/// Error codes carried by an [`ERROR_REPLY_KIND`] reply's first payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfsErrorCode {
    NotFound = 0x01,
    PermissionDenied = 0x02,
    IsADirectory = 0x03,
    BadHandle = 0x04,
    Io = 0x05,
    Other = 0xFF,
}

/// A decoded frame, either a request or a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Encode `self` as the bytes that go on the wire, magic included.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(&MAGIC);
        out.push(self.kind);
        out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn error(code: VfsErrorCode, message: &str) -> Frame {
        let mut payload = vec![code as u8];
        payload.extend_from_slice(message.as_bytes());
        Frame {
            kind: ERROR_REPLY_KIND,
            payload,
        }
    }

    pub fn reply(kind: RequestKind, payload: Vec<u8>) -> Frame {
        Frame {
            kind: kind.reply_byte(),
            payload,
        }
    }
}

/// Outcome of scanning a buffer for the next thing to hand the caller: a
/// run of plain output bytes, a complete frame, or "need more data before
/// anything can be decided".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemuxStep {
    Output(Vec<u8>),
    Frame(Frame),
    Pending,
}

/// Scan `buf` for the next demultiplexer step, consuming from the front of
/// `buf` whatever was returned (nothing, for `Pending`).
///
/// Mirrors §4.5's demultiplexer algorithm: a magic match that turns out not
/// to be followed by a well-formed frame is never "unread" as a desync —
/// bytes before a *later, still-pending* magic are safe to emit as output
/// immediately, since nothing before the magic can ever be part of the frame.
pub fn next_step(buf: &mut Vec<u8>) -> DemuxStep {
    match find_magic(buf) {
        None => {
            if buf.is_empty() {
                DemuxStep::Pending
            } else {
                DemuxStep::Output(std::mem::take(buf))
            }
        }
        Some(0) => {
            if buf.len() < HEADER_LEN {
                return DemuxStep::Pending;
            }
            let kind = buf[2];
            let len = u32::from_le_bytes([buf[3], buf[4], buf[5], buf[6]]) as usize;
            if len > MAX_FRAME_PAYLOAD {
                // The magic was coincidental: no real frame ever declares a
                // length this large. Forward just the first magic byte as
                // output and let the next call re-scan from the second one,
                // rather than waiting forever for bytes that will never come.
                let output: Vec<u8> = buf.drain(..1).collect();
                return DemuxStep::Output(output);
            }
            let total = HEADER_LEN + len;
            if buf.len() < total {
                return DemuxStep::Pending;
            }
            let frame_bytes: Vec<u8> = buf.drain(..total).collect();
            DemuxStep::Frame(Frame {
                kind,
                payload: frame_bytes[HEADER_LEN..].to_vec(),
            })
        }
        Some(idx) => {
            let output: Vec<u8> = buf.drain(..idx).collect();
            DemuxStep::Output(output)
        }
    }
}

fn find_magic(buf: &[u8]) -> Option<usize> {
    if buf.len() < MAGIC.len() {
        return None;
    }
    buf.windows(MAGIC.len()).position(|w| w == MAGIC)
}

/// A small cursor for decoding request/reply payloads: strings are
/// `u16`-LE-length-prefixed UTF-8, byte blobs and handles are fixed-width.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        let b = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    pub fn read_u16(&mut self) -> Option<u16> {
        let b = self.data.get(self.pos..self.pos + 2)?;
        self.pos += 2;
        Some(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Option<u32> {
        let b = self.data.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_str(&mut self) -> Option<String> {
        let len = self.read_u16()? as usize;
        let b = self.data.get(self.pos..self.pos + len)?;
        self.pos += len;
        String::from_utf8(b.to_vec()).ok()
    }

    pub fn read_bytes_to_end(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        self.pos = self.data.len();
        rest
    }
}

/// A small builder mirroring [`Reader`]'s encoding choices.
#[derive(Default)]
pub struct Writer {
    out: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Writer::default()
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.out.push(v);
        self
    }

    pub fn u16(mut self, v: u16) -> Self {
        self.out.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.out.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn str(mut self, s: &str) -> Self {
        self.out.extend_from_slice(&(s.len() as u16).to_le_bytes());
        self.out.extend_from_slice(s.as_bytes());
        self
    }

    pub fn bytes(mut self, b: &[u8]) -> Self {
        self.out.extend_from_slice(b);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.out
    }
}
