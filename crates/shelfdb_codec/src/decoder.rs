//! Key decoder.

use crate::encoder::{from_sortable_bits, tags};
use crate::error::{CodecError, CodecResult};
use crate::key::Key;

/// Decode a key produced by [`crate::encode_key`].
///
/// # Errors
///
/// Returns an error on unknown tags, truncated input, malformed escapes,
/// non-UTF-8 strings or trailing bytes.
pub fn decode_key(bytes: &[u8]) -> CodecResult<Key> {
    let mut decoder = KeyDecoder::new(bytes);
    let key = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(CodecError::TrailingBytes {
            remaining: bytes.len() - decoder.pos,
        });
    }
    Ok(key)
}

/// Streaming decoder over an encoded key.
pub struct KeyDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> KeyDecoder<'a> {
    /// Create a decoder for the given bytes.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Check if all bytes have been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Decode the next key.
    pub fn decode(&mut self) -> CodecResult<Key> {
        let offset = self.pos;
        let tag = self.read_byte()?;
        match tag {
            tags::NUMBER => self.read_float().map(Key::Number),
            tags::DATE => self.read_float().map(Key::Date),
            tags::STRING => {
                let bytes = self.read_escaped()?;
                String::from_utf8(bytes)
                    .map(Key::String)
                    .map_err(|_| CodecError::InvalidUtf8)
            }
            tags::BINARY => self.read_escaped().map(Key::Binary),
            tags::ARRAY => {
                let mut items = Vec::new();
                loop {
                    match self.peek_byte()? {
                        tags::END => {
                            self.pos += 1;
                            return Ok(Key::Array(items));
                        }
                        _ => items.push(self.decode()?),
                    }
                }
            }
            other => Err(CodecError::UnknownTag { tag: other, offset }),
        }
    }

    fn read_byte(&mut self) -> CodecResult<u8> {
        let byte = self.peek_byte()?;
        self.pos += 1;
        Ok(byte)
    }

    fn peek_byte(&self) -> CodecResult<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(CodecError::UnexpectedEof)
    }

    fn read_float(&mut self) -> CodecResult<f64> {
        let end = self.pos + 8;
        let bytes: [u8; 8] = self
            .data
            .get(self.pos..end)
            .and_then(|slice| slice.try_into().ok())
            .ok_or(CodecError::UnexpectedEof)?;
        self.pos = end;
        Ok(from_sortable_bits(u64::from_be_bytes(bytes)))
    }

    fn read_escaped(&mut self) -> CodecResult<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let byte = self.read_byte()?;
            if byte != 0x00 {
                out.push(byte);
                continue;
            }
            match self.read_byte()? {
                0x00 => return Ok(out),
                0x01 => out.push(0x00),
                other => return Err(CodecError::InvalidEscape { byte: other }),
            }
        }
    }
}
