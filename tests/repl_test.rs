//! Exercises [`boardlink::repl::ReplEngine`] against the scripted
//! [`support::FakeDeviceTransport`]: code submission, error surfacing,
//! `stop()` recovery, and raw-paste (transparent downgrade and the
//! exact-window-size credit boundary).

mod support;

use std::time::Duration;
use support::{always_raises, canned, raw_engine, FakeDeviceTransport};

#[test]
fn exec_raw_round_trips_stdout() {
    let mut engine = raw_engine(canned(b"hello from device\n"));
    let out = engine.exec_raw(b"print('hi')", Duration::from_secs(2)).unwrap();
    assert_eq!(out.stdout, b"hello from device\n");
}

#[test]
fn exec_raw_surfaces_stderr_as_cmd_error() {
    let mut engine = raw_engine(always_raises("Traceback (most recent call last):\nValueError\n"));
    let err = engine.exec_raw(b"raise ValueError()", Duration::from_secs(2)).unwrap_err();
    match err {
        boardlink::Error::CmdError { stderr_text, .. } => {
            assert!(stderr_text.contains("ValueError"));
        }
        other => panic!("expected CmdError, got {other:?}"),
    }
}

#[test]
fn stop_returns_to_friendly_prompt() {
    let mut engine = raw_engine(canned(b""));
    engine.stop().unwrap();
    assert_eq!(engine.state(), boardlink::repl::ReplState::Friendly);
}

#[test]
fn raw_paste_downgrades_transparently_when_unsupported() {
    // `raw_engine` wraps a device that declines the raw-paste probe.
    let mut engine = raw_engine(canned(b"ok\n"));
    let out = engine.try_raw_paste(b"print('ok')", Duration::from_secs(2)).unwrap();
    assert_eq!(out.stdout, b"ok\n");
}

#[test]
fn raw_paste_transfers_code_shorter_than_window() {
    let transport = FakeDeviceTransport::with_raw_paste(canned(b"short\n"), 64);
    let mut engine = boardlink::repl::ReplEngine::new(transport);
    engine.enter_raw(Duration::from_secs(2)).unwrap();
    let out = engine.try_raw_paste(b"print('short')", Duration::from_secs(2)).unwrap();
    assert_eq!(out.stdout, b"short\n");
}

#[test]
fn raw_paste_waits_for_credit_when_code_exactly_fills_the_window() {
    // A code unit whose length exactly equals the advertised window must
    // still receive one more credit byte before the host may send the
    // terminating Ctrl-D; this is the boundary the device-side credit
    // mirror in `support` is built to exercise.
    let window = 16u16;
    let code = repeated(b'a', window as usize);
    let transport = FakeDeviceTransport::with_raw_paste(canned(b"boundary ok\n"), window);
    let mut engine = boardlink::repl::ReplEngine::new(transport);
    engine.enter_raw(Duration::from_secs(2)).unwrap();
    let out = engine.try_raw_paste(&code, Duration::from_secs(2)).unwrap();
    assert_eq!(out.stdout, b"boundary ok\n");
}

#[test]
fn raw_paste_caches_support_across_calls() {
    let transport = FakeDeviceTransport::with_raw_paste(canned(b"a\n"), 128);
    let mut engine = boardlink::repl::ReplEngine::new(transport);
    engine.enter_raw(Duration::from_secs(2)).unwrap();
    engine.try_raw_paste(b"print('a')", Duration::from_secs(2)).unwrap();
    // A second call must not re-probe (the fake only answers the probe
    // bytes at the top-level Raw state); if the engine cached the wrong
    // thing this call would desync instead of succeeding again.
    let out = engine.try_raw_paste(b"print('a')", Duration::from_secs(2)).unwrap();
    assert_eq!(out.stdout, b"a\n");
}

fn repeated(byte: u8, len: usize) -> Vec<u8> {
    std::iter::repeat(byte).take(len).collect()
}
