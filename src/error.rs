use thiserror::Error;

/// Errors returned by codec, `Connection` and `Client` operations.
#[derive(Error, Debug)]
pub enum ConnError {
    /// Dial, handshake or socket I/O failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Bytes on the wire do not form a valid frame
    #[error("framing error: {0}")]
    Framing(String),
    /// Caller supplied an unusable argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The broker refused or garbled the CONNECT handshake
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The connection was disconnected and will not be re-established
    #[error("connection closed")]
    Closed,
}

impl ConnError {
    /// Whether a reliable connection should reconnect and retry after this
    /// error. Everything except `Closed` and `InvalidArgument` qualifies.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConnError::Io(_) | ConnError::Framing(_) | ConnError::Protocol(_)
        )
    }
}
