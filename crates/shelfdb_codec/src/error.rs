//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding keys.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The value is not a valid key (NaN, object, boolean, null, ...).
    #[error("invalid key: {reason}")]
    InvalidKey {
        /// Why the value cannot be used as a key.
        reason: String,
    },

    /// Input ended in the middle of an encoded key.
    #[error("unexpected end of encoded key")]
    UnexpectedEof,

    /// A byte that is not one of the known type tags.
    #[error("unknown key type tag 0x{tag:02x} at offset {offset}")]
    UnknownTag {
        /// The offending byte.
        tag: u8,
        /// Position in the input.
        offset: usize,
    },

    /// A null byte followed by something other than escape or terminator.
    #[error("invalid escape sequence 0x00 0x{byte:02x}")]
    InvalidEscape {
        /// The byte after the null.
        byte: u8,
    },

    /// Decoded string bytes are not UTF-8.
    #[error("invalid UTF-8 in string key")]
    InvalidUtf8,

    /// A complete key was decoded but bytes remain.
    #[error("{remaining} trailing bytes after encoded key")]
    TrailingBytes {
        /// Number of unconsumed bytes.
        remaining: usize,
    },

    /// A hex string in the log could not be decoded.
    #[error("invalid hex: {message}")]
    InvalidHex {
        /// Description from the hex decoder.
        message: String,
    },
}

impl CodecError {
    /// Create an invalid key error.
    pub fn invalid_key(reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            reason: reason.into(),
        }
    }
}

impl From<hex::FromHexError> for CodecError {
    fn from(err: hex::FromHexError) -> Self {
        Self::InvalidHex {
            message: err.to_string(),
        }
    }
}
