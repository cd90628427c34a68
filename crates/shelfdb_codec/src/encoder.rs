//! Order-preserving key encoder.

use crate::error::CodecResult;
use crate::key::Key;

/// Type tags. Their numeric order is the order between key kinds.
pub mod tags {
    /// Ends an array; sorts before every element tag.
    pub const END: u8 = 0x00;
    /// Number key.
    pub const NUMBER: u8 = 0x10;
    /// Date key.
    pub const DATE: u8 = 0x20;
    /// String key.
    pub const STRING: u8 = 0x30;
    /// Binary key.
    pub const BINARY: u8 = 0x40;
    /// Array key.
    pub const ARRAY: u8 = 0x50;
}

const SIGN_BIT: u64 = 0x8000_0000_0000_0000;
const ESCAPE: u8 = 0x01;
const TERMINATOR: u8 = 0x00;

/// Encode a key into bytes whose lexicographic order equals key order.
///
/// Layout per key kind:
/// - number / date: tag, then the IEEE-754 bits made sortable (sign bit
///   flipped for positives, all bits flipped for negatives), big-endian
/// - string (UTF-8) / binary: tag, bytes with `0x00` escaped as `0x00 0x01`,
///   then `0x00 0x00`
/// - array: tag, each element, then `0x00`
///
/// # Errors
///
/// Returns [`crate::CodecError::InvalidKey`] if the key contains NaN.
///
/// # Example
///
/// ```
/// use shelfdb_codec::{encode_key, Key};
///
/// let a = encode_key(&Key::from(-3)).unwrap();
/// let b = encode_key(&Key::from("a")).unwrap();
/// assert!(a < b);
/// ```
pub fn encode_key(key: &Key) -> CodecResult<Vec<u8>> {
    key.validate()?;
    let mut encoder = KeyEncoder::with_capacity(16);
    encoder.encode(key);
    Ok(encoder.into_bytes())
}

/// Incremental key encoder.
///
/// Callers must validate the key first; [`encode_key`] does both.
#[derive(Debug, Default)]
pub struct KeyEncoder {
    buffer: Vec<u8>,
}

impl KeyEncoder {
    /// Create an encoder with the given buffer capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Append the encoding of `key`.
    pub fn encode(&mut self, key: &Key) {
        match key {
            Key::Number(n) => self.encode_float(tags::NUMBER, *n),
            Key::Date(d) => self.encode_float(tags::DATE, *d),
            Key::String(s) => self.encode_escaped(tags::STRING, s.as_bytes()),
            Key::Binary(b) => self.encode_escaped(tags::BINARY, b),
            Key::Array(items) => {
                self.buffer.push(tags::ARRAY);
                for item in items {
                    self.encode(item);
                }
                self.buffer.push(tags::END);
            }
        }
    }

    /// Consume the encoder and return the bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    fn encode_float(&mut self, tag: u8, value: f64) {
        self.buffer.push(tag);
        self.buffer
            .extend_from_slice(&sortable_bits(value).to_be_bytes());
    }

    fn encode_escaped(&mut self, tag: u8, data: &[u8]) {
        self.buffer.push(tag);
        for &byte in data {
            self.buffer.push(byte);
            if byte == 0x00 {
                self.buffer.push(ESCAPE);
            }
        }
        self.buffer.push(TERMINATOR);
        self.buffer.push(TERMINATOR);
    }
}

/// Map an `f64` to a `u64` whose unsigned order matches numeric order.
#[must_use]
pub fn sortable_bits(value: f64) -> u64 {
    // Collapse -0.0 onto 0.0 so equal keys encode identically.
    let value = if value == 0.0 { 0.0 } else { value };
    let bits = value.to_bits();
    if bits & SIGN_BIT == 0 {
        bits ^ SIGN_BIT
    } else {
        !bits
    }
}

/// Inverse of [`sortable_bits`].
#[must_use]
pub fn from_sortable_bits(sortable: u64) -> f64 {
    let bits = if sortable & SIGN_BIT != 0 {
        sortable ^ SIGN_BIT
    } else {
        !sortable
    };
    f64::from_bits(bits)
}
