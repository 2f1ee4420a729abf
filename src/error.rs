//! Error types for the WebSocket engine

use std::fmt;
use std::io;

/// Result type alias for WebSocket operations
pub type Result<T> = std::result::Result<T, Error>;

/// WebSocket error types
#[derive(Debug)]
pub enum Error {
    /// I/O error from the underlying transport
    Io(io::Error),
    /// Structurally invalid WebSocket frame
    InvalidFrame(&'static str),
    /// Invalid UTF-8 in a text message or close reason
    InvalidUtf8,
    /// Protocol violation
    Protocol(&'static str),
    /// Connection closed by the peer
    ConnectionClosed,
    /// Connection reset by the peer
    ConnectionReset,
    /// Declared frame length exceeds the configured cap
    FrameTooLarge,
    /// Reassembled message exceeds the configured cap
    MessageTooLarge,
    /// Close frame carried an out-of-range status code
    InvalidCloseCode(u16),
    /// Invalid HTTP in the opening handshake
    InvalidHttp(&'static str),
    /// Opening handshake failed before the connection was promoted to open
    Handshake(&'static str),
}

impl Error {
    /// The close status code the peer must see for this error.
    ///
    /// Handshake errors never reach frame traffic, so anything without a
    /// protocol-level mapping collapses to abnormal closure.
    pub fn close_code(&self) -> u16 {
        match self {
            Error::Protocol(_) | Error::InvalidFrame(_) | Error::InvalidCloseCode(_) => {
                CloseReason::PROTOCOL_ERROR
            }
            Error::InvalidUtf8 => CloseReason::INVALID_PAYLOAD,
            Error::FrameTooLarge | Error::MessageTooLarge => CloseReason::TOO_BIG,
            _ => CloseReason::ABNORMAL,
        }
    }
}

/// Close frame status code and reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// Close status code
    pub code: u16,
    /// Optional reason string
    pub reason: String,
}

impl CloseReason {
    /// Normal closure
    pub const NORMAL: u16 = 1000;
    /// Going away (e.g., server shutdown)
    pub const GOING_AWAY: u16 = 1001;
    /// Protocol error
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// Unsupported data
    pub const UNSUPPORTED: u16 = 1003;
    /// Reserved (must not be sent)
    pub const RESERVED: u16 = 1004;
    /// No status received
    pub const NO_STATUS: u16 = 1005;
    /// Abnormal closure (transport dropped without a close frame)
    pub const ABNORMAL: u16 = 1006;
    /// Invalid frame payload data
    pub const INVALID_PAYLOAD: u16 = 1007;
    /// Policy violation
    pub const POLICY: u16 = 1008;
    /// Message too big
    pub const TOO_BIG: u16 = 1009;
    /// Mandatory extension missing
    pub const EXTENSION: u16 = 1010;
    /// Internal server error
    pub const INTERNAL: u16 = 1011;
    /// TLS handshake failed (never sent on the wire)
    pub const TLS_HANDSHAKE: u16 = 1015;

    /// Create a new close reason
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Check if the close code may appear in a close frame per RFC 6455
    pub fn is_valid_code(code: u16) -> bool {
        matches!(code, 1000..=1003 | 1007..=1011 | 3000..=4999)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::InvalidFrame(msg) => write!(f, "invalid frame: {}", msg),
            Error::InvalidUtf8 => write!(f, "invalid UTF-8 in text payload"),
            Error::Protocol(msg) => write!(f, "protocol error: {}", msg),
            Error::ConnectionClosed => write!(f, "connection closed"),
            Error::ConnectionReset => write!(f, "connection reset by peer"),
            Error::FrameTooLarge => write!(f, "frame too large"),
            Error::MessageTooLarge => write!(f, "message too large"),
            Error::InvalidCloseCode(code) => write!(f, "invalid close code: {}", code),
            Error::InvalidHttp(msg) => write!(f, "invalid HTTP: {}", msg),
            Error::Handshake(msg) => write!(f, "handshake failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionReset => Error::ConnectionReset,
            io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof => Error::ConnectionClosed,
            _ => Error::Io(e),
        }
    }
}
