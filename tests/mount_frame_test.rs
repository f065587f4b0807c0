//! The wire framing and demultiplexer are pure functions over byte buffers,
//! so they're tested directly without any REPL engine involved: encode/decode
//! symmetry, no-loss interleaving of frames with plain REPL output, and
//! graceful handling of a coincidental magic byte pair inside ordinary text.

use boardlink::mount::frame::{DemuxStep, Frame, RequestKind, VfsErrorCode};

#[test]
fn request_kind_byte_round_trips() {
    for kind in [
        RequestKind::Stat,
        RequestKind::ListDir,
        RequestKind::Open,
        RequestKind::Read,
        RequestKind::Close,
        RequestKind::Write,
        RequestKind::Remove,
        RequestKind::Mkdir,
        RequestKind::Rename,
    ] {
        assert_eq!(RequestKind::from_byte(kind.as_byte()), Some(kind));
        assert_eq!(kind.reply_byte(), kind.as_byte() | 0x80);
    }
}

#[test]
fn demux_emits_plain_output_with_no_magic() {
    let mut buf = b"hello from the interpreter\r\n".to_vec();
    let step = boardlink::mount::frame::next_step(&mut buf);
    assert_eq!(step, DemuxStep::Output(b"hello from the interpreter\r\n".to_vec()));
    assert!(buf.is_empty());
}

#[test]
fn demux_waits_for_a_full_frame_before_consuming_it() {
    let frame = Frame::reply(RequestKind::Stat, vec![2, 5, 0, 0, 0]);
    let encoded = frame.encode();
    let mut partial = encoded[..encoded.len() - 1].to_vec();
    assert_eq!(boardlink::mount::frame::next_step(&mut partial), DemuxStep::Pending);
    assert_eq!(partial.len(), encoded.len() - 1);
}

#[test]
fn demux_decodes_a_complete_frame_and_consumes_exactly_its_bytes() {
    let frame = Frame::reply(RequestKind::Stat, vec![2, 5, 0, 0, 0]);
    let mut buf = frame.encode();
    buf.extend_from_slice(b"trailing output");
    let step = boardlink::mount::frame::next_step(&mut buf);
    assert_eq!(step, DemuxStep::Frame(frame));
    assert_eq!(buf, b"trailing output");
}

#[test]
fn demux_preserves_byte_order_across_interleaved_output_and_frames() {
    let frame = Frame::reply(RequestKind::ListDir, vec![0, 0, 0, 0]);
    let mut buf = b">>> ".to_vec();
    buf.extend_from_slice(&frame.encode());
    buf.extend_from_slice(b"done\r\n");

    let mut collected_output = Vec::new();
    let mut frames = Vec::new();
    loop {
        match boardlink::mount::frame::next_step(&mut buf) {
            DemuxStep::Output(bytes) => collected_output.extend(bytes),
            DemuxStep::Frame(f) => frames.push(f),
            DemuxStep::Pending => break,
        }
    }
    assert_eq!(collected_output, b">>> done\r\n");
    assert_eq!(frames, vec![frame]);
}

#[test]
fn a_magic_like_byte_pair_inside_plain_output_is_forwarded_as_output() {
    // 0xF5 0x5A appears in the middle of ordinary bytes, immediately
    // followed by a complete 7-byte header whose declared length is
    // implausibly large (far beyond any real VFS payload). The demultiplexer
    // must forward the magic bytes as output instead of waiting forever for
    // a frame body that will never arrive.
    let mut buf = vec![b'x', b'y', 0xF5, 0x5A, 0x01];
    buf.extend_from_slice(&(u32::MAX).to_le_bytes());
    buf.extend_from_slice(b"more output after");

    let mut collected = Vec::new();
    loop {
        match boardlink::mount::frame::next_step(&mut buf) {
            DemuxStep::Output(bytes) => collected.extend(bytes),
            DemuxStep::Frame(f) => panic!("expected no real frame, got {f:?}"),
            DemuxStep::Pending => break,
        }
    }
    assert_eq!(collected, b"xy\xf5\x5a\x01\xff\xff\xff\xffmore output after");
}

#[test]
fn demux_still_waits_when_a_plausible_header_is_only_partially_present() {
    let frame = Frame::reply(RequestKind::Stat, vec![2, 5, 0, 0, 0]);
    let mut buf = b"xy".to_vec();
    let encoded = frame.encode();
    buf.extend_from_slice(&encoded[..encoded.len() - 1]);
    // `xy` is plain output; the rest is a genuine, plausibly-sized header
    // that just hasn't fully arrived yet — must stay Pending, not be
    // mistaken for a coincidental magic.
    assert_eq!(boardlink::mount::frame::next_step(&mut buf), DemuxStep::Output(b"xy".to_vec()));
    assert_eq!(boardlink::mount::frame::next_step(&mut buf), DemuxStep::Pending);
}

#[test]
fn error_reply_carries_code_and_message() {
    let frame = Frame::error(VfsErrorCode::PermissionDenied, "nope");
    assert_eq!(frame.kind, boardlink::mount::frame::ERROR_REPLY_KIND);
    assert_eq!(frame.payload[0], VfsErrorCode::PermissionDenied as u8);
    assert_eq!(&frame.payload[1..], b"nope");
}
