//! Error types for decoding wire frames.
//!
//! Decoding is the one place where untrusted bytes enter the system, so every
//! failure names the frame field it tripped on. A [`DecodeError`] never
//! reaches the apply path as a panic; callers log it and move on.

use thiserror::Error;

/// Result type for decode operations.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Errors produced while decoding a command or event frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The buffer ended before a field could be read.
    #[error("truncated frame: field '{field}' needs {needed} bytes, {available} available")]
    Truncated {
        /// Field being read when the buffer ran out.
        field: &'static str,
        /// Bytes required for the field.
        needed: usize,
        /// Bytes left in the buffer.
        available: usize,
    },

    /// The declared frame length disagrees with the buffer.
    #[error("frame length {declared} is invalid for a buffer of {available} bytes")]
    LengthMismatch {
        /// Length written in the frame header.
        declared: usize,
        /// Length of the buffer handed to the decoder.
        available: usize,
    },

    /// The frame body does not match its checksum.
    #[error("checksum mismatch: header says {expected:#010x}, body hashes to {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum stored in the header.
        expected: u32,
        /// Checksum computed over the body.
        actual: u32,
    },

    /// The frame declares a version this decoder cannot read.
    #[error("unsupported frame version {0}")]
    UnsupportedVersion(u8),

    /// The tag byte does not name a known message in this direction.
    #[error("unknown {kind} tag {tag:#04x}")]
    UnknownTag {
        /// "command" or "event".
        kind: &'static str,
        /// The offending tag byte.
        tag: u8,
    },

    /// A status byte is `Unknown` or outside the enumeration.
    #[error("invalid status {value} in field '{field}'")]
    InvalidStatus {
        /// Field that carried the status.
        field: &'static str,
        /// Raw byte value.
        value: u8,
    },
}

impl DecodeError {
    /// Name of the field the error refers to, when there is one.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            DecodeError::Truncated { field, .. } | DecodeError::InvalidStatus { field, .. } => {
                Some(*field)
            }
            DecodeError::LengthMismatch { .. } => Some("frame_len"),
            DecodeError::ChecksumMismatch { .. } => Some("crc32"),
            DecodeError::UnsupportedVersion(_) => Some("version"),
            DecodeError::UnknownTag { .. } => Some("tag"),
        }
    }
}
