//! Protocol error types.
//!
//! All three variants are transport-level and fatal to the connection that
//! produced them. Business failures (unknown user, wrong password, ...) are
//! not errors at this layer; they travel inside the response envelope as
//! [`crate::ErrorKind`] values and leave the connection open.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Preamble carried a version this implementation does not speak.
    /// Raised before the header is parsed; header layout may differ
    /// across versions.
    #[error("unsupported protocol version {version}")]
    UnsupportedVersion { version: u8 },

    /// Frame is structurally invalid: unknown encoding tag, oversized
    /// header or content, undecodable header or payload.
    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },

    /// Compact-mode content failed checksum verification.
    #[error("checksum mismatch: frame says {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { expected: u32, computed: u32 },
}

impl ProtocolError {
    /// Creates a `MalformedFrame` error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedFrame {
            reason: reason.into(),
        }
    }
}
