//! Error types for the AMI client crate.

use thiserror::Error;

/// AMI error type covering all failure modes of the wire client.
#[derive(Debug, Error)]
pub enum AmiError {
    // Connection errors
    /// The server closed the connection, or the client was already closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Operation timed out.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Any other I/O failure on the socket.
    #[error("i/o error: {0}")]
    Io(String),

    /// The server greeting was not an Asterisk Call Manager banner.
    #[error("unexpected banner: {0:?}")]
    InvalidBanner(String),

    // Message errors
    /// A message or action could not be encoded or parsed.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// A single line exceeded the maximum accepted length.
    #[error("line too long: {size} bytes exceeds maximum of {max} bytes")]
    LineTooLong {
        /// Actual line length.
        size: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// A message carried more headers than the client accepts.
    #[error("too many headers: more than {max} in one message")]
    TooManyHeaders {
        /// Maximum allowed header count.
        max: usize,
    },
}

/// Result type alias for AMI operations.
pub type Result<T> = std::result::Result<T, AmiError>;

impl AmiError {
    /// True when the link is unusable after this error.
    ///
    /// Encoding and framing errors leave the link up: nothing was written,
    /// or the reader can resynchronise at the next line.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            AmiError::ConnectionClosed(_) | AmiError::Timeout(_) | AmiError::Io(_)
        )
    }
}

impl From<std::io::Error> for AmiError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::TimedOut => AmiError::Timeout(err.to_string()),
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => AmiError::ConnectionClosed(err.to_string()),
            _ => AmiError::Io(err.to_string()),
        }
    }
}
