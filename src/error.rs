//! Error types for the PIXNET protocol and PXNT container codec.
//!
//! The wire protocol and the PXNT file format each define their own closed
//! error-code namespace (§6.4); keeping them as separate enums prevents a
//! PXNT-specific code from ever leaking onto the wire, or vice versa.

use std::io;
use thiserror::Error;

/// Result type for top-level PIXNET operations.
pub type Result<T> = std::result::Result<T, PixnetError>;

/// Wire protocol error codes (§6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum WireErrorCode {
    /// Malformed or out-of-sequence framing.
    ProtocolError = 1000,
    /// Client requested an unsupported protocol version.
    UnsupportedVersion = 1001,
    /// Frame or message referenced a session ID the server does not own.
    InvalidSession = 1002,
    /// Inbound message exceeded the configured size limit.
    FrameTooLarge = 1003,
    /// Frame CRC-32 did not match the transmitted payload.
    ChecksumMismatch = 1004,
    /// Keepalive deadline elapsed without a response.
    Timeout = 1005,
    /// Client exceeded the configured inbound event rate.
    RateLimited = 1006,
    /// Pointer or input event referenced a category/zone that does not exist.
    InvalidZone = 1007,
    /// Input zone submission failed validation.
    ValidationFailed = 1008,
}

/// PXNT container error codes (§6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum PxntErrorCode {
    /// Header or footer magic did not match `PXNT`/`TNXP`.
    InvalidMagic = 1000,
    /// File declared an unsupported container version.
    UnsupportedVersion = 1001,
    /// Header or data CRC-32 did not match.
    ChecksumMismatch = 1002,
    /// Width/height/pixel format/compression enum out of range.
    InvalidDimensions = 1003,
    /// Stream ended before a declared section was fully read.
    TruncatedFile = 1004,
    /// Compression enum value not recognized.
    InvalidCompression = 1005,
    /// A length-prefixed section claimed more bytes than remain in the file.
    SectionOverflow = 1006,
}

/// Errors that occur while driving the wire protocol / session state machine.
#[derive(Debug, Error)]
pub enum WireError {
    /// Underlying transport I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A typed protocol fault, carrying its wire error code.
    #[error("wire protocol error {code:?}: {message}")]
    Protocol {
        /// The error code to report to the peer in a `PIXERR` frame.
        code: WireErrorCode,
        /// Human-readable detail for logs.
        message: String,
    },

    /// The transport closed before a complete message was read.
    #[error("connection closed")]
    ConnectionClosed,
}

impl WireError {
    /// Constructs a typed protocol error.
    pub fn protocol(code: WireErrorCode, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
        }
    }

    /// The wire error code this error should be reported as, if any.
    #[must_use]
    pub fn code(&self) -> Option<WireErrorCode> {
        match self {
            Self::Protocol { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Errors that occur while reading or writing a PXNT container.
#[derive(Debug, Error)]
pub enum PxntError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A typed container fault, carrying its PXNT error code.
    #[error("PXNT error {code:?}: {message}")]
    Format {
        /// The error code identifying the kind of container fault.
        code: PxntErrorCode,
        /// Human-readable detail for logs.
        message: String,
    },
}

impl PxntError {
    /// Constructs a typed container format error.
    pub fn format(code: PxntErrorCode, message: impl Into<String>) -> Self {
        Self::Format {
            code,
            message: message.into(),
        }
    }

    /// The PXNT error code this error should be reported as.
    #[must_use]
    pub fn code(&self) -> Option<PxntErrorCode> {
        match self {
            Self::Format { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Top-level error type unifying wire, PXNT, and configuration failures.
#[derive(Debug, Error)]
pub enum PixnetError {
    /// A wire protocol / session failure.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// A PXNT container failure.
    #[error(transparent)]
    Pxnt(#[from] PxntError),

    /// Invalid server/session configuration supplied by the application.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<io::Error> for PixnetError {
    fn from(e: io::Error) -> Self {
        Self::Wire(WireError::Io(e))
    }
}
