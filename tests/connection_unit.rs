//! Unit tests for the error type.
//!
//! Connection behaviour against a live socket is covered by
//! `connection_tests.rs` and the inline tests in connection.rs.

use std::io;
use stompwire::ConnError;

#[test]
fn conn_error_io_display() {
    let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
    let display = format!("{}", ConnError::Io(io_err));
    assert!(display.contains("io error"));
    assert!(display.contains("connection refused"));
}

#[test]
fn conn_error_variant_display() {
    assert_eq!(
        ConnError::Framing("missing NUL".into()).to_string(),
        "framing error: missing NUL"
    );
    assert_eq!(
        ConnError::InvalidArgument("no listener given".into()).to_string(),
        "invalid argument: no listener given"
    );
    assert_eq!(
        ConnError::Protocol("expected CONNECTED, got MESSAGE".into()).to_string(),
        "protocol error: expected CONNECTED, got MESSAGE"
    );
    assert_eq!(ConnError::Closed.to_string(), "connection closed");
}

#[test]
fn conn_error_io_from() {
    let conn_err: ConnError = io::Error::new(io::ErrorKind::TimedOut, "timeout").into();
    match conn_err {
        ConnError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::TimedOut),
        _ => panic!("expected Io variant"),
    }
}

#[test]
fn only_transport_errors_are_retryable() {
    assert!(ConnError::Io(io::Error::other("reset")).is_retryable());
    assert!(ConnError::Framing("bad".into()).is_retryable());
    assert!(ConnError::Protocol("refused".into()).is_retryable());
    assert!(!ConnError::InvalidArgument("bad".into()).is_retryable());
    assert!(!ConnError::Closed.is_retryable());
}

#[test]
fn conn_error_is_error_trait() {
    fn assert_error<E: std::error::Error + Send + Sync + 'static>() {}
    assert_error::<ConnError>();
}
