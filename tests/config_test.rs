//! [`boardlink::config::SessionBuilder`] validation: recognised baud rates,
//! a nonzero chunk size, and the defaults a caller gets for free.

use boardlink::config::SessionBuilder;
use boardlink::Error;
use std::time::Duration;

#[test]
fn build_fails_with_no_endpoint_configured() {
    let err = SessionBuilder::new().build().unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
}

#[test]
fn build_rejects_an_unrecognised_baud_rate() {
    let err = SessionBuilder::new().serial("/dev/ttyACM0", 12345).build().unwrap_err();
    match err {
        Error::InvalidConfig(msg) => assert!(msg.contains("12345")),
        other => panic!("expected InvalidConfig, got {other:?}"),
    }
}

#[test]
fn build_accepts_a_recognised_baud_rate() {
    let config = SessionBuilder::new().serial("/dev/ttyACM0", 115200).build().unwrap();
    assert_eq!(config.exec_timeout, Duration::from_secs(10));
    assert_eq!(config.reconnect_timeout, Duration::from_secs(15));
}

#[test]
fn build_rejects_a_zero_chunk_size() {
    let err = SessionBuilder::new()
        .serial("/dev/ttyACM0", 115200)
        .chunk_size(0)
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
}

#[test]
fn tcp_endpoint_gets_the_default_port_appended_when_missing() {
    let config = SessionBuilder::new().tcp("192.168.1.50").build().unwrap();
    match config.endpoint {
        boardlink::config::Endpoint::Tcp { address } => assert_eq!(address, "192.168.1.50:23"),
        other => panic!("expected Tcp endpoint, got {other:?}"),
    }
}

#[test]
fn tcp_endpoint_keeps_an_explicit_port() {
    let config = SessionBuilder::new().tcp("192.168.1.50:8266").build().unwrap();
    match config.endpoint {
        boardlink::config::Endpoint::Tcp { address } => assert_eq!(address, "192.168.1.50:8266"),
        other => panic!("expected Tcp endpoint, got {other:?}"),
    }
}

#[test]
fn explicit_timeouts_override_the_defaults() {
    let config = SessionBuilder::new()
        .serial("/dev/ttyACM0", 115200)
        .timeout(Duration::from_secs(3))
        .reconnect_timeout(Duration::from_secs(30))
        .build()
        .unwrap();
    assert_eq!(config.exec_timeout, Duration::from_secs(3));
    assert_eq!(config.reconnect_timeout, Duration::from_secs(30));
}
