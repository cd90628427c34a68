//! # ShelfDB Codec
//!
//! Order-preserving encoding for object-store keys.
//!
//! [`encode_key`] maps a [`Key`] to bytes such that comparing the bytes
//! lexicographically gives the same answer as comparing the keys:
//!
//! - numbers < dates < strings < binary < arrays
//! - numbers and dates by value
//! - strings by Unicode code point
//! - binary keys bytewise
//! - arrays element-wise, a proper prefix first
//!
//! Every valid key round-trips: `decode_key(&encode_key(k)?)? == k`.
//!
//! ## Usage
//!
//! ```
//! use shelfdb_codec::{decode_key, encode_key, Key};
//!
//! let key = Key::from(vec![Key::from("user"), Key::from(42)]);
//! let bytes = encode_key(&key).unwrap();
//! assert_eq!(decode_key(&bytes).unwrap(), key);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod key;

pub use decoder::{decode_key, KeyDecoder};
pub use encoder::{encode_key, from_sortable_bits, sortable_bits, tags, KeyEncoder};
pub use error::{CodecError, CodecResult};
pub use key::Key;

/// Lower-case hex, as written into log lines.
#[must_use]
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Parses hex written by [`to_hex`].
///
/// # Errors
///
/// Returns [`CodecError::InvalidHex`] for odd lengths or non-hex digits.
pub fn from_hex(text: &str) -> CodecResult<Vec<u8>> {
    Ok(hex::decode(text)?)
}
